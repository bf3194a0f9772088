use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::TrackerError;

/// Lifecycle phase of a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Phase {
    NotStarted = 0,
    Running = 1,
    Stopping = 2,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Phase::NotStarted,
            1 => Phase::Running,
            _ => Phase::Stopping,
        }
    }
}

/// Tri-state start/stop signal between a tracker and its sampler thread.
///
/// The phase only moves forward, one step at a time. Readers poll the phase
/// with a single atomic load; waiters park on a condvar instead of spinning.
#[derive(Debug)]
pub struct Barrier {
    phase: AtomicU8,
    lock: Mutex<()>,
    changed: Condvar,
}

impl Default for Barrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Barrier {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::NotStarted as u8),
            lock: Mutex::new(()),
            changed: Condvar::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    /// Moves to `next`, which must be the immediate successor of the current phase.
    pub fn advance(&self, next: Phase) -> Result<(), TrackerError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.phase();
        let allowed = matches!(
            (current, next),
            (Phase::NotStarted, Phase::Running) | (Phase::Running, Phase::Stopping)
        );
        if !allowed {
            return Err(TrackerError::BarrierRegression {
                from: current,
                to: next,
            });
        }
        self.phase.store(next as u8, Ordering::Release);
        self.changed.notify_all();
        Ok(())
    }

    /// Blocks until the phase leaves `NotStarted`, returning the new phase.
    pub fn wait_until_started(&self) -> Phase {
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        while self.phase() == Phase::NotStarted {
            guard = self
                .changed
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.phase()
    }

    /// Sleeps for `period` unless the phase leaves `Running` first.
    ///
    /// Returns whether the barrier is still `Running`.
    pub fn sleep_while_running(&self, period: Duration) -> bool {
        let deadline = Instant::now() + period;
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            guard = self
                .changed
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        self.is_running()
    }
}
