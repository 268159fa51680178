//! Process-wide processor counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Cumulative counters shared by the processor and its background tasks.
#[derive(Debug, Default)]
pub struct ProcessorStats {
    runs: AtomicU64,
    runs_failed: AtomicU64,
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    parse_failures: AtomicU64,
    requeued: AtomicU64,
    requeue_dropped: AtomicU64,
}

/// Point-in-time copy of [`ProcessorStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub runs: u64,
    pub runs_failed: u64,
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub parse_failures: u64,
    pub requeued: u64,
    /// Jobs lost because their requeue failed.
    pub requeue_dropped: u64,
}

impl ProcessorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            requeue_dropped: self.requeue_dropped.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_run(&self, success: bool) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.runs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_dispatched(&self, n: usize) {
        self.dispatched.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_requeued(&self) {
        self.requeued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_requeue_dropped(&self) {
        self.requeue_dropped.fetch_add(1, Ordering::Relaxed);
    }
}
