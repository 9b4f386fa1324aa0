//! Grid observability counters.
//!
//! Atomic counters bumped on the grid's hot paths and a plain snapshot type
//! for reading them from user code.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared atomic counters for one grid cache.
///
/// All reads and writes use `Ordering::Relaxed`; metrics are advisory,
/// not transactional.
#[derive(Debug, Default)]
pub struct GridCounters {
    /// Full resyncs completed.
    pub resyncs: AtomicU64,
    /// Resyncs abandoned because the store listing was unavailable.
    pub resyncs_unavailable: AtomicU64,
    /// Pushed store batches applied to the cache.
    pub incremental_applied: AtomicU64,
    /// Pushed store batches dropped because the cache was dirty.
    pub incremental_dropped: AtomicU64,
    /// Change batches handed to the notifier.
    pub batches_dispatched: AtomicU64,
    /// Receivers evicted for invalid tokens.
    pub receivers_evicted: AtomicU64,
    /// Receiver calls that panicked and were caught.
    pub receivers_panicked: AtomicU64,
    /// Committed extracts that moved anything.
    pub extracts_committed: AtomicU64,
    /// Committed injects that stored anything.
    pub injects_committed: AtomicU64,
    /// Periodic ticks run.
    pub ticks: AtomicU64,
    /// Ticks whose inner call failed (error or caught panic).
    pub tick_failures: AtomicU64,
}

impl GridCounters {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            resyncs: self.resyncs.load(Ordering::Relaxed),
            resyncs_unavailable: self.resyncs_unavailable.load(Ordering::Relaxed),
            incremental_applied: self.incremental_applied.load(Ordering::Relaxed),
            incremental_dropped: self.incremental_dropped.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            receivers_evicted: self.receivers_evicted.load(Ordering::Relaxed),
            receivers_panicked: self.receivers_panicked.load(Ordering::Relaxed),
            extracts_committed: self.extracts_committed.load(Ordering::Relaxed),
            injects_committed: self.injects_committed.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            tick_failures: self.tick_failures.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of [`GridCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Full resyncs completed.
    pub resyncs: u64,
    /// Resyncs abandoned because the store listing was unavailable.
    pub resyncs_unavailable: u64,
    /// Pushed store batches applied to the cache.
    pub incremental_applied: u64,
    /// Pushed store batches dropped because the cache was dirty.
    pub incremental_dropped: u64,
    /// Change batches handed to the notifier.
    pub batches_dispatched: u64,
    /// Receivers evicted for invalid tokens.
    pub receivers_evicted: u64,
    /// Receiver calls that panicked and were caught.
    pub receivers_panicked: u64,
    /// Committed extracts that moved anything.
    pub extracts_committed: u64,
    /// Committed injects that stored anything.
    pub injects_committed: u64,
    /// Periodic ticks run.
    pub ticks: u64,
    /// Ticks whose inner call failed.
    pub tick_failures: u64,
}
