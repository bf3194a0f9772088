use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use perf_events::BenchmarkParameters;

use crate::InstanceRegistry;

/// Counter polled by default alongside the caller's marker names
pub const DEFAULT_TRACKED: &str = "LLC-misses";

/// Default polling period of the background thread
pub const DEFAULT_PERIOD: Duration = Duration::from_micros(100);

/// Construction parameters of a [`BackgroundTracker`](crate::BackgroundTracker)
pub struct TrackerConfig {
    /// Marker names for manually pushed samples; they take indices `0..n`
    pub names: Vec<String>,
    /// Counters the background thread polls, registered after `names`
    pub tracked: Vec<String>,
    /// Workload size hint; also the normalization of the summary window
    pub scale: u64,
    pub params: BenchmarkParameters,
    pub print_header: bool,
    pub period: Duration,
    pub output: Box<dyn Write + Send>,
    pub registry: Arc<InstanceRegistry>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            tracked: vec![DEFAULT_TRACKED.to_string()],
            scale: 1,
            params: BenchmarkParameters::default(),
            print_header: true,
            period: DEFAULT_PERIOD,
            output: Box::new(io::stderr()),
            registry: InstanceRegistry::global(),
        }
    }
}

impl TrackerConfig {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Replaces the polled counter set
    pub fn tracked<I, S>(mut self, tracked: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracked = tracked.into_iter().map(Into::into).collect();
        self
    }

    pub fn scale(mut self, scale: u64) -> Self {
        self.scale = scale;
        self
    }

    pub fn params(mut self, params: BenchmarkParameters) -> Self {
        self.params = params;
        self
    }

    pub fn print_header(mut self, print_header: bool) -> Self {
        self.print_header = print_header;
        self
    }

    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Sets the polling period in microseconds
    pub fn period_us(self, period_us: u64) -> Self {
        self.period(Duration::from_micros(period_us))
    }

    pub fn output(mut self, output: impl Write + Send + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    /// Uses a private instance registry instead of the process-wide one
    pub fn registry(mut self, registry: Arc<InstanceRegistry>) -> Self {
        self.registry = registry;
        self
    }
}

/// Construction parameters of a [`WindowedSampler`](crate::WindowedSampler)
pub struct TimeslicedConfig {
    /// Length of each measurement window
    pub window: Duration,
    pub scale: u64,
    pub params: BenchmarkParameters,
    /// Print a header before the first window's line
    pub print_header: bool,
    pub output: Box<dyn Write + Send>,
}

impl TimeslicedConfig {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            scale: 1,
            params: BenchmarkParameters::default(),
            print_header: true,
            output: Box::new(io::stderr()),
        }
    }

    pub fn scale(mut self, scale: u64) -> Self {
        self.scale = scale;
        self
    }

    pub fn params(mut self, params: BenchmarkParameters) -> Self {
        self.params = params;
        self
    }

    pub fn print_header(mut self, print_header: bool) -> Self {
        self.print_header = print_header;
        self
    }

    pub fn output(mut self, output: impl Write + Send + 'static) -> Self {
        self.output = Box::new(output);
        self
    }
}
