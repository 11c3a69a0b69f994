//! Sync cursor bookkeeping for wearsync.
//!
//! The cursor is the persisted `last_sync_timestamp` used as the "since"
//! bound of the next sync run. It is advisory: rows are only ever removed
//! from the durable store after their chunk was delivered, so the store
//! itself remains the record of what still has to be sent. The cursor is
//! kept conservative on top of that:
//! - Absent means "sync everything" (epoch 0)
//! - It only moves forward, never backward
//! - It is set to the wall-clock completion time of a fully successful
//!   run, not to the newest delivered sample

use wearsync_types::Timestamp;

/// Monotonic, advisory sync watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncCursor {
    last: Option<Timestamp>,
}

impl SyncCursor {
    /// Create a cursor from the persisted value (if any).
    pub fn new(last: Option<Timestamp>) -> Self {
        Self { last }
    }

    /// The last successful sync time, if one was ever recorded.
    pub fn last_sync(&self) -> Option<Timestamp> {
        self.last
    }

    /// Lower bound (exclusive) for the next run's page reads.
    pub fn since(&self) -> Timestamp {
        self.last.unwrap_or(Timestamp::EPOCH)
    }

    /// Advance to the completion time of a successful run.
    ///
    /// Returns the value to persist. A completion time behind the stored
    /// value (clock stepped back) keeps the stored value.
    pub fn advance(&mut self, completed_at: Timestamp) -> Timestamp {
        let next = match self.last {
            Some(prev) if prev > completed_at => prev,
            _ => completed_at,
        };
        self.last = Some(next);
        next
    }
}
