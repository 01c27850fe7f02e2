use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for everything the pipeline drops or fails on.
///
/// Nothing is retried, so these plus the log are the only record of
/// transient failures.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub records_skipped: AtomicU64,
    pub events_emitted: AtomicU64,
    pub events_processed: AtomicU64,
    pub geo_failures: AtomicU64,
    pub store_failures: AtomicU64,
    pub notify_failures: AtomicU64,
    pub task_failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub records_skipped: u64,
    pub events_emitted: u64,
    pub events_processed: u64,
    pub geo_failures: u64,
    pub store_failures: u64,
    pub notify_failures: u64,
    pub task_failures: u64,
}

impl PipelineStats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            geo_failures: self.geo_failures.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            notify_failures: self.notify_failures.load(Ordering::Relaxed),
            task_failures: self.task_failures.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// True when no per-item or per-task failure was recorded.
    pub fn is_clean(&self) -> bool {
        self.geo_failures == 0
            && self.store_failures == 0
            && self.notify_failures == 0
            && self.task_failures == 0
    }
}
