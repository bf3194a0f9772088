use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::{EventSource, PerfEventError, RawReading};

/// One scripted response to [`EventSource::read_raw`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptStep {
    /// Return this count (enabled and running times are equal)
    Value(u64),
    /// Fail the read as if the kernel returned `actual` bytes
    ShortRead(usize),
}

/// Observable counters shared between a [`ScriptedSource`] and its creator
#[derive(Debug, Default)]
pub struct ScriptStats {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub reads: AtomicUsize,
}

impl ScriptStats {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Deterministic in-memory counter for tests and dry runs.
///
/// Reads consume the script front to back. Once the script is exhausted the
/// source keeps counting up by `step` from the last value.
pub struct ScriptedSource {
    name: String,
    script: VecDeque<ScriptStep>,
    step: u64,
    last: RawReading,
    stats: Arc<ScriptStats>,
}

impl ScriptedSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: VecDeque::new(),
            step: 1,
            last: RawReading::default(),
            stats: Arc::new(ScriptStats::default()),
        }
    }

    /// Appends steps to the script
    pub fn with_script(mut self, steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        self.script.extend(steps);
        self
    }

    /// Sets the increment used after the script runs out
    pub fn with_step(mut self, step: u64) -> Self {
        self.step = step;
        self
    }

    /// Handle for observing start/stop/read calls after the source is moved away
    pub fn stats(&self) -> Arc<ScriptStats> {
        self.stats.clone()
    }

    pub fn boxed(self) -> Box<dyn EventSource> {
        Box::new(self)
    }
}

impl EventSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> Result<(), PerfEventError> {
        self.stats.starts.fetch_add(1, Ordering::SeqCst);
        self.last = RawReading::default();
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PerfEventError> {
        self.stats.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_raw(&mut self) -> Result<RawReading, PerfEventError> {
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        let value = match self.script.pop_front() {
            Some(ScriptStep::Value(value)) => value,
            Some(ScriptStep::ShortRead(actual)) => {
                return Err(PerfEventError::ShortRead {
                    expected: RawReading::SIZE,
                    actual,
                })
            }
            None => self.last.value.saturating_add(self.step),
        };
        let elapsed = self.last.time_enabled + 1;
        self.last = RawReading {
            value,
            time_enabled: elapsed,
            time_running: elapsed,
        };
        Ok(self.last)
    }

    fn cheap_read(&self) -> u64 {
        self.last.scaled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_then_step() {
        let mut source = ScriptedSource::new("fake")
            .with_script([ScriptStep::Value(10), ScriptStep::ShortRead(8)])
            .with_step(5);
        let stats = source.stats();

        assert_eq!(source.read_raw().unwrap().value, 10);
        assert!(matches!(
            source.read_raw(),
            Err(PerfEventError::ShortRead {
                expected: 24,
                actual: 8
            })
        ));
        // A failed read leaves the cached value untouched
        assert_eq!(source.cheap_read(), 10);
        assert_eq!(source.read_raw().unwrap().value, 15);
        assert_eq!(stats.reads(), 3);
    }

    #[test]
    fn test_start_resets() {
        let mut source = ScriptedSource::new("fake").with_step(3);
        let stats = source.stats();
        source.read_raw().unwrap();
        source.start().unwrap();
        assert_eq!(source.cheap_read(), 0);
        source.stop().unwrap();
        assert_eq!(stats.starts(), 1);
        assert_eq!(stats.stops(), 1);
    }
}
