use std::io::Write;
use std::time::Instant;

use log::error;

use crate::{BenchmarkParameters, CounterGroup, PerfEventError};

/// Narrowest column a window report prints
const MIN_COLUMN_WIDTH: usize = 10;

/// State of one open measurement interval over a [`CounterGroup`].
///
/// Unlike [`PerfEventBlock`] this does not borrow the group, so owners that
/// keep a group for a long time (such as a background tracker) can hold the
/// window next to it and close it explicitly.
#[derive(Debug)]
pub struct MeasurementWindow {
    scale: u64,
    params: BenchmarkParameters,
    print_header: bool,
    start: Instant,
}

impl MeasurementWindow {
    /// Starts every counter of `group`. A scale of zero is treated as one.
    pub fn open(
        group: &mut CounterGroup,
        scale: u64,
        params: BenchmarkParameters,
        print_header: bool,
    ) -> Self {
        if let Err(e) = group.start_all() {
            error!("failed to start counters: {}", e);
        }
        Self {
            scale: scale.max(1),
            params,
            print_header,
            start: Instant::now(),
        }
    }

    pub fn scale(&self) -> u64 {
        self.scale
    }

    pub fn params(&self) -> &BenchmarkParameters {
        &self.params
    }

    /// Labels the line this window will print
    pub fn set_param(&mut self, key: &str, value: impl ToString) {
        self.params.set(key, value);
    }

    /// Reads and stops every counter and writes the report line.
    ///
    /// The line is written even when a counter fails to read; the first
    /// counter error is returned afterwards.
    pub fn close(
        self,
        group: &mut CounterGroup,
        out: &mut dyn Write,
    ) -> Result<(), PerfEventError> {
        self.stop(group).write(out)
    }

    /// Reads and stops every counter, capturing the line to print later.
    pub fn stop(self, group: &mut CounterGroup) -> WindowReport {
        let elapsed = self.start.elapsed();
        let read = group.read_all();
        let stop = group.stop_all();

        let mut columns: Vec<(String, String)> = self
            .params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        columns.push(("time_sec".to_string(), format!("{:.6}", elapsed.as_secs_f64())));
        columns.push(("scale".to_string(), self.scale.to_string()));
        for source in group.iter() {
            let per_op = source.cheap_read() as f64 / self.scale as f64;
            columns.push((source.name().to_string(), format!("{:.2}", per_op)));
        }

        WindowReport {
            columns,
            print_header: self.print_header,
            error: read.and(stop).err(),
        }
    }
}

/// Line of a stopped [`MeasurementWindow`], not yet written
#[derive(Debug)]
pub struct WindowReport {
    columns: Vec<(String, String)>,
    print_header: bool,
    error: Option<PerfEventError>,
}

impl WindowReport {
    /// `(label, value)` pairs in print order
    pub fn columns(&self) -> &[(String, String)] {
        &self.columns
    }

    /// Writes the line, then returns the first counter error of the window.
    pub fn write(self, out: &mut dyn Write) -> Result<(), PerfEventError> {
        let widths: Vec<usize> = self
            .columns
            .iter()
            .map(|(label, value)| label.len().max(value.len()).max(MIN_COLUMN_WIDTH))
            .collect();

        if self.print_header {
            let labels = self.columns.iter().map(|(label, _)| label.as_str());
            write_row(out, labels, &widths)?;
        }
        write_row(out, self.columns.iter().map(|(_, value)| value.as_str()), &widths)?;
        out.flush().map_err(PerfEventError::ReportError)?;

        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn write_row<'c>(
    out: &mut dyn Write,
    cells: impl Iterator<Item = &'c str>,
    widths: &[usize],
) -> Result<(), PerfEventError> {
    let line = cells
        .zip(widths)
        .map(|(cell, &width)| format!("{:>width$}", cell, width = width))
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(out, "{}", line).map_err(PerfEventError::ReportError)
}

/// Scoped measurement window over a [`CounterGroup`].
///
/// Opening the block resets and starts every counter. Dropping it reads and
/// stops them and prints one report line to the sink, preceded by a header
/// line when requested. Counter columns are normalized by `scale`.
///
/// # Examples
///
/// ```
/// use perf_events::{BenchmarkParameters, CounterGroup, PerfEventBlock, ScriptedSource};
///
/// let cycles = ScriptedSource::new("cycles").with_step(1000);
/// let mut group = CounterGroup::from_sources(vec![cycles.boxed()]);
/// let mut out = Vec::new();
/// {
///     let params = BenchmarkParameters::new();
///     let _block = PerfEventBlock::new(&mut group, 10, params, true, &mut out);
///     // ... measured code ...
/// }
/// let report = String::from_utf8(out).unwrap();
/// assert_eq!(report.lines().count(), 2);
/// assert!(report.lines().nth(1).unwrap().ends_with("100.00"));
/// ```
pub struct PerfEventBlock<'a> {
    group: &'a mut CounterGroup,
    out: &'a mut dyn Write,
    window: Option<MeasurementWindow>,
}

impl<'a> PerfEventBlock<'a> {
    /// Opens a window. A scale of zero is treated as one.
    pub fn new(
        group: &'a mut CounterGroup,
        scale: u64,
        params: BenchmarkParameters,
        print_header: bool,
        out: &'a mut dyn Write,
    ) -> Self {
        let window = MeasurementWindow::open(group, scale, params, print_header);
        Self {
            group,
            out,
            window: Some(window),
        }
    }

    pub fn scale(&self) -> u64 {
        self.window.as_ref().map_or(1, MeasurementWindow::scale)
    }

    /// Labels the line this block will print
    pub fn set_param(&mut self, key: &str, value: impl ToString) {
        if let Some(window) = self.window.as_mut() {
            window.set_param(key, value);
        }
    }

    /// Closes the window now, surfacing any read or write error.
    pub fn finish(mut self) -> Result<(), PerfEventError> {
        match self.window.take() {
            Some(window) => window.close(self.group, self.out),
            None => Ok(()),
        }
    }
}

impl Drop for PerfEventBlock<'_> {
    fn drop(&mut self) {
        if let Some(window) = self.window.take() {
            if let Err(e) = window.close(self.group, self.out) {
                error!("failed to report measurement window: {}", e);
            }
        }
    }
}
