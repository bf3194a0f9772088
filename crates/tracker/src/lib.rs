//! # tracker
//!
//! Low-overhead hardware counter traces for instrumented workloads.
//!
//! [`BackgroundTracker`] polls counters on a dedicated thread while any
//! application thread adds its own timestamped markers, and writes the merged
//! trace as a column-aligned table when dropped. [`WindowedSampler`] instead
//! reports a counter group in consecutive fixed-length windows.
//!
//! Building with the `no-background-tracking` feature turns the [`Tracker`]
//! alias into the recording-free [`PassthroughTracker`].

mod barrier;
mod clock;
mod config;
mod error;
mod instance;
mod passthrough;
mod registry;
mod report;
mod sample_log;
mod timesliced;
mod tracker;

pub use barrier::*;
pub use clock::*;
pub use config::*;
pub use error::*;
pub use instance::*;
pub use passthrough::*;
pub use registry::*;
pub use report::*;
pub use sample_log::*;
pub use timesliced::*;
pub use tracker::{sample_sources, BackgroundTracker, LocalRecorder, TrackedSource};

/// The tracker selected at build time
#[cfg(not(feature = "no-background-tracking"))]
pub type Tracker = BackgroundTracker;

/// The tracker selected at build time
#[cfg(feature = "no-background-tracking")]
pub type Tracker = PassthroughTracker;
