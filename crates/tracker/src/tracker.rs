use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error};
use perf_events::{
    BenchmarkParameters, CounterGroup, EventOpener, EventSource, MeasurementWindow, WindowReport,
};

use crate::{
    render_report, Barrier, InstanceGuard, LocalLog, Phase, Sample, ThreadLogs, TrackerConfig,
    TrackerError, TrackerRegistry,
};

/// A polled counter and its registry index
pub struct TrackedSource {
    pub index: u32,
    pub source: Box<dyn EventSource>,
}

/// Summary measurement spanning a tracker's whole lifetime
pub(crate) struct SummaryWindow {
    group: CounterGroup,
    output: Box<dyn Write + Send>,
    window: Option<MeasurementWindow>,
}

impl SummaryWindow {
    pub(crate) fn open(
        mut group: CounterGroup,
        output: Box<dyn Write + Send>,
        scale: u64,
        params: BenchmarkParameters,
        print_header: bool,
    ) -> Self {
        let window = MeasurementWindow::open(&mut group, scale, params, print_header);
        Self {
            group,
            output,
            window: Some(window),
        }
    }

    pub(crate) fn output(&mut self) -> &mut dyn Write {
        &mut self.output
    }

    /// Reads and stops the counters; the line is written by [`Self::write`]
    pub(crate) fn stop(&mut self) -> Option<WindowReport> {
        let window = self.window.take()?;
        Some(window.stop(&mut self.group))
    }

    pub(crate) fn write(&mut self, report: WindowReport) {
        if let Err(e) = report.write(&mut self.output) {
            error!("failed to report measurement window: {}", e);
        }
    }

    pub(crate) fn close(&mut self) {
        if let Some(report) = self.stop() {
            self.write(report);
        }
    }
}

struct Shared {
    registry: TrackerRegistry,
    logs: ThreadLogs,
    barrier: Barrier,
}

/// Samples hardware counters on a background thread while the workload runs.
///
/// Construction starts a thread that polls the tracked counters every
/// `period`; any thread may add its own samples with
/// [`push_sample`](Self::push_sample). Each thread records into its own log,
/// so recording never contends. Dropping the tracker stops the thread,
/// stops the counters and writes every log as an aligned
/// `event, time_us, value` table followed by the summary window line.
///
/// Only one tracker may be live per [`InstanceRegistry`](crate::InstanceRegistry).
///
/// # Examples
///
/// ```
/// use perf_events::{CounterGroup, EventSource, PerfEventError, ScriptedSource};
/// use tracker::{BackgroundTracker, InstanceRegistry, TrackerConfig};
///
/// let mut opener = |name: &str| -> Result<Box<dyn EventSource>, PerfEventError> {
///     Ok(ScriptedSource::new(name).boxed())
/// };
/// let config = TrackerConfig::new(["iteration"])
///     .registry(InstanceRegistry::new())
///     .output(std::io::sink());
/// let tracker = BackgroundTracker::new(config, CounterGroup::from_sources(vec![]), &mut opener)?;
/// for i in 0..10 {
///     tracker.push_named("iteration", i);
/// }
/// drop(tracker); // writes the report
/// # Ok::<(), tracker::TrackerError>(())
/// ```
pub struct BackgroundTracker {
    shared: Arc<Shared>,
    print_header: bool,
    summary: Mutex<SummaryWindow>,
    sampler: Option<JoinHandle<Vec<TrackedSource>>>,
    _instance: InstanceGuard,
}

impl BackgroundTracker {
    /// Claims the instance registry, opens the tracked counters through
    /// `opener`, opens the summary window over `group` and starts sampling.
    pub fn new<O: EventOpener>(
        config: TrackerConfig,
        group: CounterGroup,
        opener: &mut O,
    ) -> Result<Self, TrackerError> {
        let instance = config.registry.claim()?;
        let registry = TrackerRegistry::new(config.names, config.tracked);

        // Highest index first
        let mut tracked = Vec::new();
        for index in registry.tracked_range().rev() {
            let source = opener.open(registry.name(index))?;
            tracked.push(TrackedSource { index, source });
        }
        for t in &mut tracked {
            t.source.start()?;
        }

        let summary = SummaryWindow::open(
            group,
            config.output,
            config.scale,
            config.params,
            config.print_header,
        );

        let shared = Arc::new(Shared {
            registry,
            logs: ThreadLogs::new(config.scale),
            barrier: Barrier::new(),
        });

        let sampler = {
            let shared = shared.clone();
            let period = config.period;
            thread::Builder::new()
                .name("perf-tracker".to_string())
                .spawn(move || sampler_loop(shared, tracked, period))
                .map_err(TrackerError::Spawn)?
        };
        shared.barrier.advance(Phase::Running)?;
        debug!(
            "tracker started: {} counters, polling every {:?}",
            shared.registry.tracked_range().len(),
            config.period
        );

        Ok(Self {
            shared,
            print_header: config.print_header,
            summary: Mutex::new(summary),
            sampler: Some(sampler),
            _instance: instance,
        })
    }

    /// Tracks the default counters with real `perf_event_open` counters and
    /// the default benchmark counter set as summary window.
    #[cfg(target_os = "linux")]
    pub fn with_default_events(config: TrackerConfig) -> Result<Self, TrackerError> {
        Self::new(config, CounterGroup::default_events(), &mut perf_events::PerfOpener)
    }

    /// Records `value` under counter `index` in the calling thread's log
    pub fn push_sample(&self, index: u32, value: u64) {
        self.shared.logs.push(Sample::now(index, value));
    }

    /// Records `value` under the index of `name`, or [`NOT_FOUND`](crate::NOT_FOUND)
    pub fn push_named(&self, name: &str, value: u64) {
        self.push_sample(self.id_for_name(name), value);
    }

    pub fn id_for_name(&self, name: &str) -> u32 {
        self.shared.registry.id_for_name(name)
    }

    /// Registered names: the marker names followed by the tracked counters
    pub fn names(&self) -> &[String] {
        self.shared.registry.names()
    }

    pub fn registry(&self) -> &TrackerRegistry {
        &self.shared.registry
    }

    pub fn phase(&self) -> Phase {
        self.shared.barrier.phase()
    }

    /// Recorder bound to the calling thread's log, for hot loops
    pub fn local_log(&self) -> LocalRecorder<'_> {
        LocalRecorder {
            log: self.shared.logs.local(),
            registry: &self.shared.registry,
        }
    }
}

impl Drop for BackgroundTracker {
    fn drop(&mut self) {
        if let Err(e) = self.shared.barrier.advance(Phase::Stopping) {
            error!("failed to stop tracker: {}", e);
        }

        let mut tracked = match self.sampler.take().map(JoinHandle::join) {
            Some(Ok(tracked)) => tracked,
            Some(Err(_)) => {
                error!("tracker sampler thread panicked");
                Vec::new()
            }
            None => Vec::new(),
        };
        for t in &mut tracked {
            if let Err(e) = t.source.stop() {
                error!("failed to stop counter {}: {}", t.source.name(), e);
            }
        }

        let summary = self
            .summary
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        let summary_report = summary.stop();

        // The sampler thread held the only other reference and has exited
        let logs = match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.logs.drain(),
            None => {
                error!("tracker state still shared at teardown, skipping sample report");
                Vec::new()
            }
        };

        if let Err(e) = render_report(
            &self.shared.registry,
            &logs,
            self.print_header,
            summary.output(),
        ) {
            error!("failed to write sample report: {}", e);
        }
        if let Some(report) = summary_report {
            summary.write(report);
        }

        debug!(
            "tracker stopped: {} samples from {} threads",
            logs.iter().map(Vec::len).sum::<usize>(),
            logs.len()
        );
    }
}

/// Records into one thread's log without the thread-local lookup
pub struct LocalRecorder<'a> {
    log: LocalLog<'a>,
    registry: &'a TrackerRegistry,
}

impl LocalRecorder<'_> {
    pub fn push_sample(&self, index: u32, value: u64) {
        self.log.push(Sample::now(index, value));
    }

    pub fn push_named(&self, name: &str, value: u64) {
        self.push_sample(self.registry.id_for_name(name), value);
    }
}

/// Reads every tracked counter once and records the results.
///
/// A failed read is logged and the counter's last good value is recorded.
pub fn sample_sources(sources: &mut [TrackedSource], registry: &TrackerRegistry, log: &LocalLog) {
    for t in sources.iter_mut() {
        if let Err(e) = t.source.read_raw() {
            error!("Error reading counter {}: {}", registry.name(t.index), e);
        }
        log.push(Sample::now(t.index, t.source.cheap_read()));
    }
}

fn sampler_loop(
    shared: Arc<Shared>,
    mut sources: Vec<TrackedSource>,
    period: Duration,
) -> Vec<TrackedSource> {
    if shared.barrier.wait_until_started() != Phase::Running {
        return sources;
    }

    let log = shared.logs.local();
    loop {
        sample_sources(&mut sources, &shared.registry, &log);
        if !shared.barrier.sleep_while_running(period) {
            break;
        }
    }
    drop(log);
    sources
}
