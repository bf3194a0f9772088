use crate::PerfEventError;

/// The three words a counter descriptor yields on `read(2)`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RawReading {
    /// Raw event count
    pub value: u64,
    /// Nanoseconds the counter was enabled
    pub time_enabled: u64,
    /// Nanoseconds the counter was actually scheduled on the PMU
    pub time_running: u64,
}

impl RawReading {
    /// Size of a reading as laid out by the kernel
    pub const SIZE: usize = 3 * std::mem::size_of::<u64>();

    /// Decodes a reading from native-endian bytes.
    pub fn from_bytes(buf: &[u8; Self::SIZE]) -> Self {
        let word = |i: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[i * 8..(i + 1) * 8]);
            u64::from_ne_bytes(bytes)
        };
        Self {
            value: word(0),
            time_enabled: word(1),
            time_running: word(2),
        }
    }

    /// Event count extrapolated over the time the counter was multiplexed out.
    pub fn scaled(&self) -> u64 {
        if self.time_running == 0 {
            return 0;
        }
        if self.time_running == self.time_enabled {
            return self.value;
        }
        let scaled = u128::from(self.value) * u128::from(self.time_enabled)
            / u128::from(self.time_running);
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }
}

/// One hardware counter the samplers can drive.
///
/// Sources are moved onto the sampling thread, so they must be `Send`.
pub trait EventSource: Send {
    /// Display name of the counter
    fn name(&self) -> &str;

    /// Resets the count and starts counting
    fn start(&mut self) -> Result<(), PerfEventError>;

    /// Stops counting; the last value stays readable
    fn stop(&mut self) -> Result<(), PerfEventError>;

    /// Performs a blocking read of the counter and caches the result
    fn read_raw(&mut self) -> Result<RawReading, PerfEventError>;

    /// Scaled value of the most recent successful [`read_raw`](Self::read_raw)
    fn cheap_read(&self) -> u64;
}

/// Resolves counter names to live sources
pub trait EventOpener {
    fn open(&mut self, name: &str) -> Result<Box<dyn EventSource>, PerfEventError>;
}

impl<F> EventOpener for F
where
    F: FnMut(&str) -> Result<Box<dyn EventSource>, PerfEventError>,
{
    fn open(&mut self, name: &str) -> Result<Box<dyn EventSource>, PerfEventError> {
        self(name)
    }
}

/// Opens real `perf_event_open` counters for the calling process
#[cfg(target_os = "linux")]
#[derive(Debug, Default, Clone, Copy)]
pub struct PerfOpener;

#[cfg(target_os = "linux")]
impl EventOpener for PerfOpener {
    fn open(&mut self, name: &str) -> Result<Box<dyn EventSource>, PerfEventError> {
        Ok(Box::new(crate::Counter::open(name)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(100, 10, 10, 100)]
    #[case(100, 20, 10, 200)]
    #[case(100, 30, 0, 0)]
    #[case(u64::MAX, 4, 2, u64::MAX)]
    fn test_scaled(
        #[case] value: u64,
        #[case] time_enabled: u64,
        #[case] time_running: u64,
        #[case] expected: u64,
    ) {
        let reading = RawReading {
            value,
            time_enabled,
            time_running,
        };
        assert_eq!(reading.scaled(), expected);
    }

    #[test]
    fn test_from_bytes() {
        let mut buf = [0u8; RawReading::SIZE];
        buf[..8].copy_from_slice(&7u64.to_ne_bytes());
        buf[8..16].copy_from_slice(&11u64.to_ne_bytes());
        buf[16..].copy_from_slice(&13u64.to_ne_bytes());

        let reading = RawReading::from_bytes(&buf);
        assert_eq!(reading.value, 7);
        assert_eq!(reading.time_enabled, 11);
        assert_eq!(reading.time_running, 13);
    }

    #[test]
    fn test_closure_opener() {
        let mut opener = |name: &str| -> Result<Box<dyn EventSource>, PerfEventError> {
            Err(PerfEventError::UnknownEvent(name.to_string()))
        };
        match opener.open("bogus") {
            Err(PerfEventError::UnknownEvent(name)) => assert_eq!(name, "bogus"),
            _ => panic!("Expected UnknownEvent error"),
        }
    }
}
