use std::sync::{Mutex, PoisonError};

use log::debug;
use perf_events::{CounterGroup, EventOpener};

use crate::tracker::SummaryWindow;
use crate::{InstanceGuard, Phase, TrackerConfig, TrackerError, TrackerRegistry, NOT_FOUND};

/// Drop-in replacement for [`BackgroundTracker`](crate::BackgroundTracker)
/// that records nothing.
///
/// It still claims the instance registry and measures its lifetime as one
/// summary window, so swapping it in keeps the end-to-end numbers without the
/// sampler thread. Every name resolves to [`NOT_FOUND`].
pub struct PassthroughTracker {
    registry: TrackerRegistry,
    summary: Mutex<SummaryWindow>,
    _instance: InstanceGuard,
}

impl PassthroughTracker {
    /// Same arguments as [`BackgroundTracker::new`](crate::BackgroundTracker::new);
    /// no tracked counter is opened, so `opener` is never called.
    pub fn new<O: EventOpener>(
        config: TrackerConfig,
        group: CounterGroup,
        _opener: &mut O,
    ) -> Result<Self, TrackerError> {
        let instance = config.registry.claim()?;
        let registry = TrackerRegistry::new(config.names, config.tracked);
        let summary = SummaryWindow::open(
            group,
            config.output,
            config.scale,
            config.params,
            config.print_header,
        );
        debug!("pass-through tracker started");
        Ok(Self {
            registry,
            summary: Mutex::new(summary),
            _instance: instance,
        })
    }

    #[cfg(target_os = "linux")]
    pub fn with_default_events(config: TrackerConfig) -> Result<Self, TrackerError> {
        Self::new(config, CounterGroup::default_events(), &mut perf_events::PerfOpener)
    }

    pub fn push_sample(&self, _index: u32, _value: u64) {}

    pub fn push_named(&self, _name: &str, _value: u64) {}

    pub fn id_for_name(&self, _name: &str) -> u32 {
        NOT_FOUND
    }

    pub fn names(&self) -> &[String] {
        self.registry.names()
    }

    pub fn registry(&self) -> &TrackerRegistry {
        &self.registry
    }

    /// Always [`Phase::Running`] while the tracker exists
    pub fn phase(&self) -> Phase {
        Phase::Running
    }

    pub fn local_log(&self) -> NoopRecorder {
        NoopRecorder
    }
}

impl Drop for PassthroughTracker {
    fn drop(&mut self) {
        self.summary
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .close();
        debug!("pass-through tracker stopped");
    }
}

/// Recorder handed out by [`PassthroughTracker::local_log`]
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl NoopRecorder {
    pub fn push_sample(&self, _index: u32, _value: u64) {}

    pub fn push_named(&self, _name: &str, _value: u64) {}
}
