#![cfg(target_os = "linux")]

use std::fs::File;
use std::io::{self, Read};

use perf_event_open_sys as sys;

use crate::{disable_counter, enable_counter, open_counter, EventSource, PerfEventError, RawReading};

/// Types of hardware performance counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    /// CPU cycles
    Cycles,
    /// CPU cycles spent in kernel mode
    KernelCycles,
    /// CPU instructions
    Instructions,
    /// L1 data cache read misses
    L1Misses,
    /// Last Level Cache misses
    LLCMisses,
    /// Mispredicted branches
    BranchMisses,
    /// Task clock in nanoseconds
    TaskClock,
}

impl CounterKind {
    /// Every known counter, in the order a default counter set reports them
    pub const ALL: [CounterKind; 7] = [
        CounterKind::Cycles,
        CounterKind::KernelCycles,
        CounterKind::Instructions,
        CounterKind::L1Misses,
        CounterKind::LLCMisses,
        CounterKind::BranchMisses,
        CounterKind::TaskClock,
    ];

    /// Looks up a counter by its display name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            CounterKind::Cycles => "cycles",
            CounterKind::KernelCycles => "kcycles",
            CounterKind::Instructions => "instructions",
            CounterKind::L1Misses => "L1-misses",
            CounterKind::LLCMisses => "LLC-misses",
            CounterKind::BranchMisses => "branch-misses",
            CounterKind::TaskClock => "task-clock",
        }
    }

    /// Returns the `(type, config, exclude_user)` triple for `perf_event_attr`
    fn attr(self) -> (u32, u64, bool) {
        use sys::bindings as b;
        match self {
            CounterKind::Cycles => {
                (b::PERF_TYPE_HARDWARE, b::PERF_COUNT_HW_CPU_CYCLES as u64, false)
            }
            CounterKind::KernelCycles => {
                (b::PERF_TYPE_HARDWARE, b::PERF_COUNT_HW_CPU_CYCLES as u64, true)
            }
            CounterKind::Instructions => {
                (b::PERF_TYPE_HARDWARE, b::PERF_COUNT_HW_INSTRUCTIONS as u64, false)
            }
            CounterKind::L1Misses => {
                let config = b::PERF_COUNT_HW_CACHE_L1D as u64
                    | (b::PERF_COUNT_HW_CACHE_OP_READ as u64) << 8
                    | (b::PERF_COUNT_HW_CACHE_RESULT_MISS as u64) << 16;
                (b::PERF_TYPE_HW_CACHE, config, false)
            }
            CounterKind::LLCMisses => {
                (b::PERF_TYPE_HARDWARE, b::PERF_COUNT_HW_CACHE_MISSES as u64, false)
            }
            CounterKind::BranchMisses => {
                (b::PERF_TYPE_HARDWARE, b::PERF_COUNT_HW_BRANCH_MISSES as u64, false)
            }
            CounterKind::TaskClock => {
                (b::PERF_TYPE_SOFTWARE, b::PERF_COUNT_SW_TASK_CLOCK as u64, false)
            }
        }
    }
}

/// A `perf_event_open` counter on the calling process
///
/// This implementation is only available on Linux platforms.
pub struct Counter {
    name: String,
    file: File,
    last: RawReading,
}

impl Counter {
    /// Opens the counter called `name`; see [`CounterKind::from_name`].
    pub fn open(name: &str) -> Result<Self, PerfEventError> {
        let kind = CounterKind::from_name(name)
            .ok_or_else(|| PerfEventError::UnknownEvent(name.to_string()))?;
        Self::open_kind(kind)
    }

    pub fn open_kind(kind: CounterKind) -> Result<Self, PerfEventError> {
        let (type_, config, exclude_user) = kind.attr();
        let file = open_counter(kind.name(), type_, config, exclude_user)?;
        Ok(Self {
            name: kind.name().to_string(),
            file,
            last: RawReading::default(),
        })
    }
}

impl EventSource for Counter {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> Result<(), PerfEventError> {
        self.last = RawReading::default();
        enable_counter(&self.file)
    }

    fn stop(&mut self) -> Result<(), PerfEventError> {
        disable_counter(&self.file)
    }

    fn read_raw(&mut self) -> Result<RawReading, PerfEventError> {
        let mut buf = [0u8; RawReading::SIZE];
        let n = loop {
            match self.file.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(PerfEventError::ReadError(e)),
            }
        };
        if n != RawReading::SIZE {
            return Err(PerfEventError::ShortRead {
                expected: RawReading::SIZE,
                actual: n,
            });
        }
        self.last = RawReading::from_bytes(&buf);
        Ok(self.last)
    }

    fn cheap_read(&self) -> u64 {
        self.last.scaled()
    }
}
