use std::cell::{RefCell, UnsafeCell};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use crate::Timestamp;

/// Largest per-thread reservation made up front, in samples
const MAX_RESERVE: usize = 1 << 16;

static NEXT_COLLECTION_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    // (collection id, log) pairs for every collection this thread has touched
    static LOCAL_LOGS: RefCell<Vec<(u64, Arc<SampleLog>)>> = const { RefCell::new(Vec::new()) };
}

/// One timestamped observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Counter index in the tracker's registry
    pub index: u32,
    pub time: Timestamp,
    pub value: u64,
}

impl Sample {
    pub fn now(index: u32, value: u64) -> Self {
        Self {
            index,
            time: Timestamp::now(),
            value,
        }
    }
}

/// Append-only samples of a single thread.
///
/// Only the owning thread appends, and only while the collection that
/// registered the log is shared; the log is read once the collection is
/// borrowed exclusively. Appends therefore never contend.
pub struct SampleLog {
    owner: ThreadId,
    samples: UnsafeCell<Vec<Sample>>,
}

// SAFETY: the samples vector is only touched by the owning thread while
// shared, and only through `&mut ThreadLogs` otherwise (see `ThreadLogs::drain`).
unsafe impl Sync for SampleLog {}

impl SampleLog {
    fn new(capacity: usize) -> Self {
        Self {
            owner: thread::current().id(),
            samples: UnsafeCell::new(Vec::with_capacity(capacity)),
        }
    }

    /// # Safety
    ///
    /// Must be called from the owning thread while no `&mut ThreadLogs`
    /// for the registering collection exists.
    unsafe fn append(&self, sample: Sample) {
        debug_assert_eq!(thread::current().id(), self.owner);
        (*self.samples.get()).push(sample);
    }
}

/// The per-thread logs of one tracker, in first-touch order.
///
/// A thread's first append registers its log under a short-held lock; later
/// appends go through a thread-local cache without locking.
pub struct ThreadLogs {
    id: u64,
    reserve: usize,
    logs: Mutex<Vec<Arc<SampleLog>>>,
}

impl ThreadLogs {
    /// Creates an empty collection. `scale` is a workload size hint used to
    /// presize each thread's log.
    pub fn new(scale: u64) -> Self {
        let threads = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let reserve = usize::try_from(scale).unwrap_or(usize::MAX) / threads;
        Self {
            id: NEXT_COLLECTION_ID.fetch_add(1, Ordering::Relaxed),
            reserve: reserve.min(MAX_RESERVE),
            logs: Mutex::new(Vec::new()),
        }
    }

    /// Appends to the calling thread's log, registering it on first use
    pub fn push(&self, sample: Sample) {
        self.with_local(|log| {
            // SAFETY: `with_local` only yields the calling thread's own log,
            // and `&self` rules out a concurrent `drain`.
            unsafe { log.append(sample) }
        });
    }

    /// Handle to the calling thread's log for repeated appends
    pub fn local(&self) -> LocalLog<'_> {
        LocalLog {
            log: self.with_local(Arc::clone),
            _owner: PhantomData,
        }
    }

    fn with_local<R>(&self, f: impl FnOnce(&Arc<SampleLog>) -> R) -> R {
        LOCAL_LOGS.with(|cell| {
            let mut cached = cell.borrow_mut();
            if let Some((_, log)) = cached.iter().find(|(id, _)| *id == self.id) {
                return f(log);
            }

            // Drop cached logs whose collection is gone
            cached.retain(|(_, log)| Arc::strong_count(log) > 1);

            let log = Arc::new(SampleLog::new(self.reserve));
            self.logs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(log.clone());
            let result = f(&log);
            cached.push((self.id, log));
            result
        })
    }

    /// Number of threads that have touched this collection
    pub fn thread_count(&self) -> usize {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Takes every thread's samples, in first-touch order.
    pub fn drain(&mut self) -> Vec<Vec<Sample>> {
        let logs = self.logs.get_mut().unwrap_or_else(PoisonError::into_inner);
        logs.iter()
            .map(|log| {
                // SAFETY: `&mut self` means no `&ThreadLogs` or `LocalLog`
                // remains, and those are the only paths to `append`.
                unsafe { std::mem::take(&mut *log.samples.get()) }
            })
            .collect()
    }
}

/// The calling thread's log, usable without the thread-local lookup.
///
/// Tied to the thread that created it and to the borrow of its collection.
pub struct LocalLog<'a> {
    log: Arc<SampleLog>,
    _owner: PhantomData<(&'a ThreadLogs, *const ())>,
}

impl LocalLog<'_> {
    pub fn push(&self, sample: Sample) {
        // SAFETY: `LocalLog` is `!Send`, so this runs on the owning thread,
        // and it borrows the collection, which rules out `drain`.
        unsafe { self.log.append(sample) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    #[test]
    fn test_per_thread_isolation() {
        let mut logs = ThreadLogs::new(0);
        let start = Barrier::new(2);

        thread::scope(|s| {
            for (marker, count) in [(1u32, 500u64), (2u32, 300u64)] {
                let logs = &logs;
                let start = &start;
                s.spawn(move || {
                    start.wait();
                    for i in 0..count {
                        logs.push(Sample::now(marker, i));
                    }
                });
            }
        });

        assert_eq!(logs.thread_count(), 2);
        let drained = logs.drain();
        assert_eq!(drained.len(), 2);
        for samples in drained {
            let marker = samples[0].index;
            let expected = if marker == 1 { 500 } else { 300 };
            assert_eq!(samples.len(), expected);
            // Each log holds one thread's samples, in push order
            assert!(samples.iter().all(|s| s.index == marker));
            assert!(samples.iter().enumerate().all(|(i, s)| s.value == i as u64));
            assert!(samples.windows(2).all(|w| w[0].time <= w[1].time));
        }
    }

    #[test]
    fn test_first_touch_order() {
        let mut logs = ThreadLogs::new(0);
        logs.push(Sample::now(0, 0));
        thread::scope(|s| {
            s.spawn(|| logs.push(Sample::now(1, 0)));
        });
        logs.push(Sample::now(0, 1));

        let drained = logs.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].iter().map(|s| s.value).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(drained[1][0].index, 1);
    }

    #[test]
    fn test_local_handle_shares_thread_log() {
        let mut logs = ThreadLogs::new(0);
        {
            let local = logs.local();
            local.push(Sample::now(3, 1));
            logs.push(Sample::now(3, 2));
            local.push(Sample::now(3, 3));
        }
        let drained = logs.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].iter().map(|s| s.value).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_collections_do_not_mix() {
        let mut a = ThreadLogs::new(0);
        let mut b = ThreadLogs::new(0);
        a.push(Sample::now(0, 1));
        b.push(Sample::now(0, 2));
        a.push(Sample::now(0, 3));

        assert_eq!(a.drain()[0].len(), 2);
        assert_eq!(b.drain()[0].len(), 1);
    }

    #[test]
    fn test_stale_cache_entries_pruned() {
        {
            let logs = ThreadLogs::new(0);
            logs.push(Sample::now(0, 0));
        }
        let logs = ThreadLogs::new(0);
        logs.push(Sample::now(0, 0));
        let cached = LOCAL_LOGS.with(|cell| cell.borrow().len());
        assert_eq!(cached, 1);
    }

    #[test]
    fn test_reserve_is_capped() {
        let logs = ThreadLogs::new(u64::MAX);
        assert_eq!(logs.reserve, MAX_RESERVE);
    }
}
