//! # perf_events
//!
//! Hardware performance counters for in-process measurement. This crate
//! provides the [`EventSource`] abstraction the samplers poll, a Linux
//! implementation on top of `perf_event_open`, named counter sets and the
//! scoped [`PerfEventBlock`] measurement window.
//!

mod block;
#[cfg(target_os = "linux")]
mod counter;
mod group;
mod helpers;
mod params;
mod scripted;
mod source;

pub use block::*;
#[cfg(target_os = "linux")]
pub use counter::*;
pub use group::*;
pub use helpers::*;
pub use params::*;
pub use scripted::*;
pub use source::*;
