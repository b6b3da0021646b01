use std::sync::atomic::{AtomicU64, Ordering};

/// Central statistics hub for a collection.
#[derive(Debug, Default)]
pub struct Statistics {
    // Operation counters
    pub total_adds: AtomicU64,
    pub total_updates: AtomicU64,
    pub total_removes: AtomicU64,
    pub total_gets: AtomicU64,

    // File counters
    pub bytes_written: AtomicU64,
    pub bytes_read: AtomicU64,
    pub slots_reused: AtomicU64,
    pub slots_freed: AtomicU64,

    // Pipeline counters
    pub ops_enqueued: AtomicU64,
    pub ops_applied: AtomicU64,
    pub encode_failures: AtomicU64,
    pub write_failures: AtomicU64,
    pub flush_count: AtomicU64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_add(&self) {
        self.total_adds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_update(&self) {
        self.total_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remove(&self) {
        self.total_removes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_get(&self) {
        self.total_gets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_bytes_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_slot_reused(&self) {
        self.slots_reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slot_freed(&self) {
        self.slots_freed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enqueued(&self) {
        self.ops_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_applied(&self) {
        self.ops_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encode_failure(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.flush_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_adds: self.total_adds.load(Ordering::Relaxed),
            total_updates: self.total_updates.load(Ordering::Relaxed),
            total_removes: self.total_removes.load(Ordering::Relaxed),
            total_gets: self.total_gets.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            slots_reused: self.slots_reused.load(Ordering::Relaxed),
            slots_freed: self.slots_freed.load(Ordering::Relaxed),
            ops_enqueued: self.ops_enqueued.load(Ordering::Relaxed),
            ops_applied: self.ops_applied.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            flush_count: self.flush_count.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of statistics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_adds: u64,
    pub total_updates: u64,
    pub total_removes: u64,
    pub total_gets: u64,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub slots_reused: u64,
    pub slots_freed: u64,
    pub ops_enqueued: u64,
    pub ops_applied: u64,
    pub encode_failures: u64,
    pub write_failures: u64,
    pub flush_count: u64,
}

impl StatsSnapshot {
    /// Format statistics as a human-readable string.
    pub fn format(&self) -> String {
        format!(
            "=== CombDB Collection Statistics ===\n\
            Operations:\n\
            - Adds: {}\n\
            - Updates: {}\n\
            - Removes: {}\n\
            - Gets: {}\n\n\
            File:\n\
            - Bytes Written: {}\n\
            - Bytes Read: {}\n\
            - Slots Reused: {}\n\
            - Slots Freed: {}\n\n\
            Pipeline:\n\
            - Enqueued: {}\n\
            - Applied: {}\n\
            - Encode Failures: {}\n\
            - Write Failures: {}\n\
            - Flushes: {}",
            self.total_adds,
            self.total_updates,
            self.total_removes,
            self.total_gets,
            self.bytes_written,
            self.bytes_read,
            self.slots_reused,
            self.slots_freed,
            self.ops_enqueued,
            self.ops_applied,
            self.encode_failures,
            self.write_failures,
            self.flush_count
        )
    }
}
