//! Progress accounting for downloads.
//!
//! Two strategies share one callback type: a sequential transfer
//! reports its own running total directly, while a parallel download
//! merges per-chunk counters into one shared aggregate. Both report
//! cumulative byte totals, never deltas.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Callback receiving the running byte total after each write.
pub type ProgressReceiver = Box<dyn Fn(u64) + Send + Sync>;

/// Running total for one sequential transfer.
pub struct SequentialProgress {
    receiver: Option<ProgressReceiver>,
    emitted: u64,
}

impl SequentialProgress {
    pub fn new(receiver: Option<ProgressReceiver>) -> Self {
        Self {
            receiver,
            emitted: 0,
        }
    }

    /// Counts `bytes` and reports the new running total.
    pub fn record(&mut self, bytes: u64) {
        self.emitted += bytes;
        if let Some(receiver) = &self.receiver {
            receiver(self.emitted);
        }
    }

    /// Forgets everything reported so far.
    ///
    /// Called when the underlying stream restarts from its beginning,
    /// so restarted bytes are not counted twice.
    pub fn reset(&mut self) {
        self.emitted = 0;
    }

    /// Bytes counted since the last reset.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

/// Shared byte total across concurrent chunk writers.
///
/// Increments take the mutex, bump the shared total, and invoke the
/// receiver with the post-increment value before releasing. The
/// receiver therefore runs while the lock is held: observed totals are
/// strictly ordered, and a slow receiver serializes all chunk writers.
/// Receivers must not block.
pub struct AggregateProgress {
    total: AtomicU64,
    receiver: Mutex<Option<ProgressReceiver>>,
}

impl AggregateProgress {
    pub fn new(receiver: Option<ProgressReceiver>) -> Self {
        Self {
            total: AtomicU64::new(0),
            receiver: Mutex::new(receiver),
        }
    }

    /// Current aggregate total.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    fn record(&self, bytes: u64) {
        let guard = self.receiver.lock();
        let total = self.total.fetch_add(bytes, Ordering::SeqCst) + bytes;
        if let Some(receiver) = guard.as_ref() {
            receiver(total);
        }
    }

    fn rewind(&self, bytes: u64) {
        let _guard = self.receiver.lock();
        self.total.fetch_sub(bytes, Ordering::SeqCst);
    }
}

/// One chunk's view of the shared aggregate.
///
/// Invariant: whenever no chunk is mid-restart, the shared total equals
/// the sum of all chunks' local counts.
pub struct ChunkProgress {
    shared: Arc<AggregateProgress>,
    local: u64,
}

impl ChunkProgress {
    pub fn new(shared: Arc<AggregateProgress>) -> Self {
        Self { shared, local: 0 }
    }

    /// Counts `bytes` for this chunk and reports the new aggregate.
    pub fn record(&mut self, bytes: u64) {
        self.local += bytes;
        self.shared.record(bytes);
    }

    /// Un-counts everything this chunk has reported.
    ///
    /// Called when the chunk's stream restarts from its beginning, so
    /// the aggregate does not over-report the restarted bytes.
    pub fn rewind(&mut self) {
        self.shared.rewind(self.local);
        self.local = 0;
    }

    /// Bytes this chunk has reported since its last restart.
    pub fn local(&self) -> u64 {
        self.local
    }
}
