use std::time::Duration;

/// Monotonic timestamp in nanoseconds since `CLOCK_MONOTONIC`'s origin.
///
/// Timestamps from different threads share one clock, so rows from separate
/// sample logs can be compared after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    #[cfg(target_os = "linux")]
    pub fn now() -> Self {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // CLOCK_MONOTONIC cannot fail with a valid timespec pointer
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
        }
        Self(ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64)
    }

    /// Nanoseconds since the first call in this process
    #[cfg(not(target_os = "linux"))]
    pub fn now() -> Self {
        static EPOCH: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
        let epoch = *EPOCH.get_or_init(std::time::Instant::now);
        Self(u64::try_from(epoch.elapsed().as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn as_micros(self) -> u64 {
        self.0 / 1_000
    }

    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic() {
        let a = Timestamp::now();
        std::thread::sleep(Duration::from_millis(1));
        let b = Timestamp::now();
        assert!(b > a);
        assert!(b.saturating_duration_since(a) >= Duration::from_millis(1));
        assert_eq!(a.saturating_duration_since(b), Duration::ZERO);
    }

    #[test]
    fn test_micros() {
        assert_eq!(Timestamp::from_nanos(12_345_678).as_micros(), 12_345);
    }
}
