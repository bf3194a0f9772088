use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error};
use perf_events::{BenchmarkParameters, CounterGroup, PerfEventBlock};

use crate::{TimeslicedConfig, TrackerError};

/// Hook invoked with the live window, at its start or just before it closes
pub type WindowCallback = Box<dyn FnMut(&mut PerfEventBlock<'_>) + Send>;

fn noop_callback() -> WindowCallback {
    Box::new(|_: &mut PerfEventBlock<'_>| {})
}

/// State shared with the window thread
struct Control {
    run: AtomicBool,
    scale: AtomicU64,
    params: Mutex<BenchmarkParameters>,
    windows: AtomicU64,
}

/// Measures a counter group in back-to-back windows of fixed length.
///
/// A background thread opens a [`PerfEventBlock`], sleeps for the window
/// length and closes it, printing one line per window. Stopping waits for
/// the window in flight to finish and report.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use perf_events::{BenchmarkParameters, CounterGroup, ScriptedSource};
/// use tracker::{TimeslicedConfig, WindowedSampler};
///
/// let group = CounterGroup::from_sources(vec![ScriptedSource::new("cycles").boxed()]);
/// let config = TimeslicedConfig::new(Duration::from_millis(5)).output(std::io::sink());
/// let sampler = WindowedSampler::new(group, config)?;
/// sampler.update(BenchmarkParameters::new().with("phase", "compute"))?;
/// let group = sampler.stop()?;
/// assert_eq!(group.len(), 1);
/// # Ok::<(), tracker::TrackerError>(())
/// ```
pub struct WindowedSampler {
    control: Arc<Control>,
    handle: Option<JoinHandle<CounterGroup>>,
}

impl WindowedSampler {
    pub fn new(group: CounterGroup, config: TimeslicedConfig) -> Result<Self, TrackerError> {
        Self::with_callbacks(group, config, noop_callback(), noop_callback())
    }

    /// Starts sampling with hooks run at the start and end of every window
    pub fn with_callbacks(
        group: CounterGroup,
        config: TimeslicedConfig,
        begin_cb: WindowCallback,
        end_cb: WindowCallback,
    ) -> Result<Self, TrackerError> {
        let control = Arc::new(Control {
            run: AtomicBool::new(true),
            scale: AtomicU64::new(config.scale),
            params: Mutex::new(config.params),
            windows: AtomicU64::new(0),
        });

        let handle = {
            let control = control.clone();
            let window = WindowLoop {
                group,
                output: config.output,
                length: config.window,
                print_header: config.print_header,
                begin_cb,
                end_cb,
            };
            thread::Builder::new()
                .name("perf-windows".to_string())
                .spawn(move || window.run(&control))
                .map_err(TrackerError::Spawn)?
        };
        debug!("windowed sampler started: {:?} windows", config.window);

        Ok(Self {
            control,
            handle: Some(handle),
        })
    }

    #[cfg(target_os = "linux")]
    pub fn default_events(config: TimeslicedConfig) -> Result<Self, TrackerError> {
        Self::new(CounterGroup::default_events(), config)
    }

    /// Normalization applied from the next window on
    pub fn set_scale(&self, scale: u64) {
        self.control.scale.store(scale, Ordering::Relaxed);
    }

    /// Replaces the parameters printed from the next window on
    pub fn update(&self, params: BenchmarkParameters) -> Result<(), TrackerError> {
        match &self.handle {
            Some(handle) if !handle.is_finished() => {
                *self
                    .control
                    .params
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = params;
                Ok(())
            }
            _ => Err(TrackerError::SamplerStopped),
        }
    }

    /// Number of windows that have closed and reported
    pub fn windows_completed(&self) -> u64 {
        self.control.windows.load(Ordering::Acquire)
    }

    /// Finishes the current window and hands the counter group back
    pub fn stop(mut self) -> Result<CounterGroup, TrackerError> {
        self.shutdown().ok_or(TrackerError::SamplerStopped)
    }

    fn shutdown(&mut self) -> Option<CounterGroup> {
        self.control.run.store(false, Ordering::Release);
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(group) => {
                debug!(
                    "windowed sampler stopped after {} windows",
                    self.windows_completed()
                );
                Some(group)
            }
            Err(_) => {
                error!("windowed sampler thread panicked");
                None
            }
        }
    }
}

impl Drop for WindowedSampler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct WindowLoop {
    group: CounterGroup,
    output: Box<dyn Write + Send>,
    length: Duration,
    print_header: bool,
    begin_cb: WindowCallback,
    end_cb: WindowCallback,
}

impl WindowLoop {
    fn run(mut self, control: &Control) -> CounterGroup {
        let mut first = true;
        while control.run.load(Ordering::Acquire) {
            let scale = control.scale.load(Ordering::Relaxed);
            let params = control
                .params
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            {
                let mut block = PerfEventBlock::new(
                    &mut self.group,
                    scale,
                    params,
                    self.print_header && first,
                    &mut self.output,
                );
                (self.begin_cb)(&mut block);
                thread::sleep(self.length);
                (self.end_cb)(&mut block);
            }
            first = false;
            control.windows.fetch_add(1, Ordering::Release);
        }
        self.group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perf_events::ScriptedSource;
    use std::sync::mpsc;
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn group(step: u64) -> CounterGroup {
        CounterGroup::from_sources(vec![ScriptedSource::new("cycles").with_step(step).boxed()])
    }

    /// Callback reporting the number of each window it sees
    fn signal(tx: mpsc::Sender<u64>) -> WindowCallback {
        let mut n = 0;
        Box::new(move |_: &mut PerfEventBlock<'_>| {
            n += 1;
            let _ = tx.send(n);
        })
    }

    fn wait_for(rx: &mpsc::Receiver<u64>, window: u64) {
        while rx.recv_timeout(Duration::from_secs(5)).unwrap() < window {}
    }

    #[test]
    fn test_windows_cover_runtime() {
        let out = SharedBuf::default();
        let window = Duration::from_millis(20);
        let sampler = WindowedSampler::new(
            group(1),
            TimeslicedConfig::new(window).output(out.clone()),
        )
        .unwrap();
        thread::sleep(window * 5);
        sampler.stop().unwrap();

        let lines = out.lines();
        // One header, then one line per window
        let windows = lines.len().saturating_sub(1);
        assert!(windows >= 4, "only {} windows", windows);
    }

    #[test]
    fn test_final_window_completes() {
        let out = SharedBuf::default();
        let (begin_tx, begin_rx) = mpsc::channel();
        let (end_tx, end_rx) = mpsc::channel();
        let sampler = WindowedSampler::with_callbacks(
            group(1),
            TimeslicedConfig::new(Duration::from_millis(50))
                .print_header(false)
                .output(out.clone()),
            signal(begin_tx),
            signal(end_tx),
        )
        .unwrap();

        wait_for(&begin_rx, 1);
        let started = Instant::now();
        let group = sampler.stop().unwrap();

        // Stopping waited for the open window instead of abandoning it
        assert_eq!(end_rx.try_recv().unwrap(), 1);
        assert!(started.elapsed() > Duration::from_millis(10));
        assert_eq!(out.lines().len(), 1);
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn test_scale_and_params_apply_to_next_window() {
        let out = SharedBuf::default();
        let (tx, rx) = mpsc::channel();
        let sampler = WindowedSampler::with_callbacks(
            group(400),
            TimeslicedConfig::new(Duration::from_millis(5))
                .params(BenchmarkParameters::new().with("phase", "warmup"))
                .output(out.clone()),
            signal(tx),
            noop_callback(),
        )
        .unwrap();

        wait_for(&rx, 1);
        sampler.set_scale(4);
        sampler
            .update(BenchmarkParameters::new().with("phase", "compute"))
            .unwrap();
        wait_for(&rx, 3);
        let completed = sampler.windows_completed();
        sampler.stop().unwrap();
        assert!(completed >= 2);

        let lines = out.lines();
        let first: Vec<&str> = lines[1].split(", ").map(str::trim).collect();
        let last: Vec<&str> = lines.last().unwrap().split(", ").map(str::trim).collect();
        assert_eq!(first[0], "warmup");
        assert_eq!(first[3], "400.00");
        assert_eq!(last[0], "compute");
        assert_eq!(last[2], "4");
        assert_eq!(last[3], "100.00");
    }

    #[test]
    fn test_header_only_on_first_window() {
        let out = SharedBuf::default();
        let (tx, rx) = mpsc::channel();
        let sampler = WindowedSampler::with_callbacks(
            group(1),
            TimeslicedConfig::new(Duration::from_millis(2)).output(out.clone()),
            noop_callback(),
            signal(tx),
        )
        .unwrap();
        wait_for(&rx, 3);
        sampler.stop().unwrap();

        let lines = out.lines();
        assert!(lines.len() >= 4);
        assert_eq!(lines.iter().filter(|l| l.contains("time_sec")).count(), 1);
        assert!(lines[0].contains("time_sec"));
    }

    #[test]
    fn test_callback_can_label_window() {
        let out = SharedBuf::default();
        let (tx, rx) = mpsc::channel();
        let mut n = 0;
        let end: WindowCallback = Box::new(move |block: &mut PerfEventBlock<'_>| {
            n += 1;
            block.set_param("window", n);
            let _ = tx.send(n);
        });
        let sampler = WindowedSampler::with_callbacks(
            group(1),
            TimeslicedConfig::new(Duration::from_millis(2))
                .print_header(false)
                .output(out.clone()),
            noop_callback(),
            end,
        )
        .unwrap();
        wait_for(&rx, 2);
        sampler.stop().unwrap();

        let lines = out.lines();
        assert_eq!(lines[0].split(", ").next().unwrap().trim(), "1");
        assert_eq!(lines[1].split(", ").next().unwrap().trim(), "2");
    }

    #[test]
    fn test_update_after_thread_exit() {
        let begin: WindowCallback =
            Box::new(|_: &mut PerfEventBlock<'_>| panic!("callback failure"));
        let sampler = WindowedSampler::with_callbacks(
            group(1),
            TimeslicedConfig::new(Duration::from_millis(1)).output(std::io::sink()),
            begin,
            noop_callback(),
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while sampler.update(BenchmarkParameters::new()).is_ok() {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(1));
        }
        assert!(matches!(
            sampler.update(BenchmarkParameters::new()),
            Err(TrackerError::SamplerStopped)
        ));
        assert_eq!(sampler.windows_completed(), 0);
        assert!(matches!(sampler.stop(), Err(TrackerError::SamplerStopped)));
    }
}
