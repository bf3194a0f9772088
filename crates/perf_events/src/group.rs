use log::{error, warn};

use crate::{EventOpener, EventSource, PerfEventError};

/// Ordered, named set of counters driven together by a measurement window
pub struct CounterGroup {
    sources: Vec<Box<dyn EventSource>>,
}

impl CounterGroup {
    /// Creates a group from already-opened sources
    pub fn from_sources(sources: Vec<Box<dyn EventSource>>) -> Self {
        Self { sources }
    }

    /// Opens every named counter; fails on the first counter that cannot be opened
    pub fn open<O: EventOpener>(opener: &mut O, names: &[&str]) -> Result<Self, PerfEventError> {
        let sources = names
            .iter()
            .map(|name| opener.open(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { sources })
    }

    /// Opens every named counter, skipping the ones the host refuses.
    ///
    /// Restrictive `perf_event_paranoid` settings or missing PMU support
    /// commonly reject a subset of counters; the rest still measure.
    pub fn open_available<O: EventOpener>(opener: &mut O, names: &[&str]) -> Self {
        let mut sources = Vec::with_capacity(names.len());
        for name in names {
            match opener.open(name) {
                Ok(source) => sources.push(source),
                Err(e) => warn!("skipping counter {}: {}", name, e),
            }
        }
        Self { sources }
    }

    /// The default benchmark counter set, minus counters the host refuses
    #[cfg(target_os = "linux")]
    pub fn default_events() -> Self {
        let names: Vec<&str> = crate::CounterKind::ALL.iter().map(|k| k.name()).collect();
        Self::open_available(&mut crate::PerfOpener, &names)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.name())
    }

    pub fn get(&self, name: &str) -> Option<&dyn EventSource> {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn EventSource> {
        self.sources.iter().map(|s| s.as_ref())
    }

    /// Starts every counter, even past a failing one; returns the first error
    pub fn start_all(&mut self) -> Result<(), PerfEventError> {
        self.for_each_source("start", |source| source.start())
    }

    /// Stops every counter, even past a failing one; returns the first error
    pub fn stop_all(&mut self) -> Result<(), PerfEventError> {
        self.for_each_source("stop", |source| source.stop())
    }

    /// Refreshes every counter's cached reading; returns the first error
    pub fn read_all(&mut self) -> Result<(), PerfEventError> {
        self.for_each_source("read", |source| source.read_raw().map(|_| ()))
    }

    fn for_each_source<F>(&mut self, action: &str, mut f: F) -> Result<(), PerfEventError>
    where
        F: FnMut(&mut dyn EventSource) -> Result<(), PerfEventError>,
    {
        let mut first = None;
        for source in &mut self.sources {
            if let Err(e) = f(source.as_mut()) {
                if first.is_none() {
                    first = Some(e);
                } else {
                    error!("failed to {} counter {}: {}", action, source.name(), e);
                }
            }
        }
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
