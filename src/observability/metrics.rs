//! Metrics registry for a record store
//!
//! - Counters only, monotonic
//! - Reset only when the store is opened
//! - Thread-safe via relaxed atomics

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for one record store
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Records appended
    records_appended: AtomicU64,
    /// Framed bytes appended
    bytes_appended: AtomicU64,
    /// Appends dropped because the store was full
    records_dropped_full: AtomicU64,
    /// Appends dropped because the record alone exceeds the ceiling
    records_dropped_too_large: AtomicU64,
    /// Appends that failed with an I/O error
    append_failures: AtomicU64,
    /// Records handed to consumers through `next`
    records_read: AtomicU64,
    /// Records deleted by compaction
    records_removed: AtomicU64,
    /// Framed bytes deleted by compaction
    bytes_removed: AtomicU64,
    /// Completed compactions
    compactions: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful append of `bytes` framed bytes
    pub fn record_append(&self, bytes: u64) {
        self.records_appended.fetch_add(1, Ordering::Relaxed);
        self.bytes_appended.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Increment drops caused by a full store
    pub fn increment_dropped_full(&self) {
        self.records_dropped_full.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment drops caused by an oversized record
    pub fn increment_dropped_too_large(&self) {
        self.records_dropped_too_large.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment failed appends
    pub fn increment_append_failures(&self) {
        self.append_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment records read
    pub fn increment_records_read(&self) {
        self.records_read.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one completed compaction
    pub fn record_compaction(&self, records: u64, bytes: u64) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
        self.records_removed.fetch_add(records, Ordering::Relaxed);
        self.bytes_removed.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Get current values as a JSON object
    pub fn to_json(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"{{"records_appended":{},"bytes_appended":{},"records_dropped_full":{},"records_dropped_too_large":{},"append_failures":{},"records_read":{},"records_removed":{},"bytes_removed":{},"compactions":{}}}"#,
            s.records_appended,
            s.bytes_appended,
            s.records_dropped_full,
            s.records_dropped_too_large,
            s.append_failures,
            s.records_read,
            s.records_removed,
            s.bytes_removed,
            s.compactions,
        )
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_appended: self.records_appended.load(Ordering::Relaxed),
            bytes_appended: self.bytes_appended.load(Ordering::Relaxed),
            records_dropped_full: self.records_dropped_full.load(Ordering::Relaxed),
            records_dropped_too_large: self.records_dropped_too_large.load(Ordering::Relaxed),
            append_failures: self.append_failures.load(Ordering::Relaxed),
            records_read: self.records_read.load(Ordering::Relaxed),
            records_removed: self.records_removed.load(Ordering::Relaxed),
            bytes_removed: self.bytes_removed.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub records_appended: u64,
    pub bytes_appended: u64,
    pub records_dropped_full: u64,
    pub records_dropped_too_large: u64,
    pub append_failures: u64,
    pub records_read: u64,
    pub records_removed: u64,
    pub bytes_removed: u64,
    pub compactions: u64,
}

impl MetricsSnapshot {
    /// Total appends dropped for any reason
    pub fn records_dropped(&self) -> u64 {
        self.records_dropped_full + self.records_dropped_too_large
    }
}
