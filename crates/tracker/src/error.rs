use perf_events::PerfEventError;
use thiserror::Error;

use crate::Phase;

/// Errors raised by the trackers and the windowed sampler
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Only one tracker may be live per instance registry
    #[error("BackgroundTracker already exists")]
    AlreadyExists,

    #[error("counter error: {0}")]
    Counter(#[from] PerfEventError),

    #[error("failed to spawn sampler thread: {0}")]
    Spawn(std::io::Error),

    /// The barrier only ever moves NotStarted -> Running -> Stopping
    #[error("invalid barrier transition from {from:?} to {to:?}")]
    BarrierRegression { from: Phase, to: Phase },

    /// The windowed sampler's thread is no longer running
    #[error("sampler thread has stopped")]
    SamplerStopped,
}
