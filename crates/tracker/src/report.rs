use std::io::{self, Write};

use crate::{Sample, TrackerRegistry, UNKNOWN_NAME};

const EVENT_LABEL: &str = "event";
const TIME_LABEL: &str = "time_us";
const VALUE_LABEL: &str = "value";

/// Column widths of a sample report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnWidths {
    pub name: usize,
    pub time: usize,
    pub value: usize,
}

impl ColumnWidths {
    /// Widest rendering of every registry name, timestamp and value, each at
    /// least as wide as its header label
    pub fn measure(registry: &TrackerRegistry, logs: &[Vec<Sample>]) -> Self {
        let mut widths = ColumnWidths {
            name: EVENT_LABEL.len(),
            time: TIME_LABEL.len(),
            value: VALUE_LABEL.len(),
        };
        for name in registry.names() {
            widths.name = widths.name.max(name.len());
        }
        for sample in logs.iter().flatten() {
            if sample.index as usize >= registry.len() {
                widths.name = widths.name.max(UNKNOWN_NAME.len());
            }
            widths.time = widths.time.max(digits(sample.time.as_micros()));
            widths.value = widths.value.max(digits(sample.value));
        }
        widths
    }
}

fn digits(mut n: u64) -> usize {
    let mut count = 1;
    while n >= 10 {
        n /= 10;
        count += 1;
    }
    count
}

/// Writes every sample as an aligned `event, time_us, value` row.
///
/// Logs are written one after another in the order given and each log in
/// append order, so rows are time-ordered per thread but not across threads.
pub fn render_report(
    registry: &TrackerRegistry,
    logs: &[Vec<Sample>],
    print_header: bool,
    out: &mut dyn Write,
) -> io::Result<()> {
    let w = ColumnWidths::measure(registry, logs);

    if print_header {
        writeln!(
            out,
            "{:>nw$}, {:>tw$}, {:>vw$}",
            EVENT_LABEL,
            TIME_LABEL,
            VALUE_LABEL,
            nw = w.name,
            tw = w.time,
            vw = w.value
        )?;
    }
    for sample in logs.iter().flatten() {
        writeln!(
            out,
            "{:>nw$}, {:>tw$}, {:>vw$}",
            registry.name(sample.index),
            sample.time.as_micros(),
            sample.value,
            nw = w.name,
            tw = w.time,
            vw = w.value
        )?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Timestamp, NOT_FOUND};

    fn sample(index: u32, micros: u64, value: u64) -> Sample {
        Sample {
            index,
            time: Timestamp::from_nanos(micros * 1_000),
            value,
        }
    }

    fn render(registry: &TrackerRegistry, logs: &[Vec<Sample>], header: bool) -> Vec<String> {
        let mut out = Vec::new();
        render_report(registry, logs, header, &mut out).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_header_width_follows_longest_name() {
        let registry = TrackerRegistry::new(["abc", "twelve-chars"], ["sevench"]);
        let logs = vec![vec![sample(0, 5, 1)]];
        let lines = render(&registry, &logs, true);

        let first_column = lines[0].split(", ").next().unwrap();
        assert_eq!(first_column.len(), 12);
        assert_eq!(first_column.trim(), "event");
    }

    #[test]
    fn test_label_floors_width() {
        let registry = TrackerRegistry::new(["a"], Vec::<String>::new());
        let logs = vec![vec![sample(0, 1, 2)]];
        let lines = render(&registry, &logs, true);
        assert_eq!(lines[0], "event, time_us, value");
        assert_eq!(lines[1], "    a,       1,     2");
    }

    #[test]
    fn test_rows_follow_log_order() {
        let registry = TrackerRegistry::new(["mark"], ["LLC-misses"]);
        // Second log is older but still printed after the first
        let logs = vec![
            vec![sample(1, 300, 10), sample(1, 400, 20)],
            vec![sample(0, 100, 7), sample(NOT_FOUND, 200, 8)],
        ];
        let lines = render(&registry, &logs, false);
        assert_eq!(lines.len(), 4);

        let fields: Vec<Vec<&str>> = lines
            .iter()
            .map(|l| l.split(", ").map(str::trim).collect())
            .collect();
        assert_eq!(fields[0], vec!["LLC-misses", "300", "10"]);
        assert_eq!(fields[1], vec!["LLC-misses", "400", "20"]);
        assert_eq!(fields[2], vec!["mark", "100", "7"]);
        assert_eq!(fields[3], vec!["unknown", "200", "8"]);

        // Every row has the same width
        assert!(lines.iter().all(|l| l.len() == lines[0].len()));
    }

    #[test]
    fn test_wide_values_widen_columns() {
        let registry = TrackerRegistry::new(["x"], Vec::<String>::new());
        let logs = vec![vec![sample(0, 1_234_567_890, u64::MAX)]];
        let widths = ColumnWidths::measure(&registry, &logs);
        assert_eq!(widths.time, 10);
        assert_eq!(widths.value, 20);
        assert_eq!(widths.name, EVENT_LABEL.len());
    }

    #[test]
    fn test_empty_logs_header_only() {
        let registry = TrackerRegistry::new(["x"], ["LLC-misses"]);
        let lines = render(&registry, &[], true);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], "     event, time_us, value");
    }
}
