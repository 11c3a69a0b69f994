//! Pending sample buffer for wearsync.
//!
//! This module provides the in-memory side of ingestion:
//! - Per-sensor lists of samples not yet persisted
//! - The flush predicate (size threshold OR elapsed interval)
//! - Retention of rows whose flush failed, ahead of newer rows
//! - After a failed flush, retries wait for the interval instead of
//!   firing on every new sample
//!
//! The buffer is owned by the single ingestion consumer in sync-client.
//! It never touches storage itself; the consumer takes rows out, persists
//! them, and hands them back with [`PendingBuffer::restore`] on failure.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use wearsync_types::{SensorEvent, SensorId};

/// When the pending buffer must be flushed to durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Flush as soon as any single sensor has this many pending rows.
    pub batch_size: usize,
    /// Flush anything pending once this much time passed since the last flush.
    pub flush_interval: Duration,
}

impl FlushPolicy {
    /// Create a flush policy.
    pub fn new(batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            batch_size,
            flush_interval,
        }
    }
}

/// Per-sensor pending rows with flush bookkeeping.
///
/// Rows flow through the buffer in this order:
/// 1. `push()` - append to the sensor's pending list
/// 2. `take()` - remove a sensor's rows for persisting
/// 3. `restore()` - put them back if persisting failed
/// 4. `mark_flushed()` - reset the interval clock after a flush cycle
/// 5. `defer_retry()` - after a cycle with failures, suspend the size
///    trigger until the next interval flush
#[derive(Debug)]
pub struct PendingBuffer {
    policy: FlushPolicy,
    /// Pending rows keyed by sensor. Entries are never left empty.
    pending: BTreeMap<SensorId, Vec<SensorEvent>>,
    last_flush: Instant,
    retry_deferred: bool,
}

impl PendingBuffer {
    /// Create an empty buffer whose interval clock starts at `now`.
    pub fn new(policy: FlushPolicy, now: Instant) -> Self {
        Self {
            policy,
            pending: BTreeMap::new(),
            last_flush: now,
            retry_deferred: false,
        }
    }

    /// The policy this buffer flushes by.
    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }

    /// Append a sample to its sensor's pending list.
    pub fn push(&mut self, event: SensorEvent) {
        self.pending
            .entry(event.sensor_id.clone())
            .or_default()
            .push(event);
    }

    /// Evaluate the flush predicate.
    ///
    /// True when some sensor reached `batch_size`, or when the flush interval
    /// elapsed and anything is pending. While a retry is deferred only the
    /// interval counts.
    pub fn should_flush(&self, now: Instant) -> bool {
        let size_reached = !self.retry_deferred
            && self
                .pending
                .values()
                .any(|rows| rows.len() >= self.policy.batch_size);
        let interval_elapsed =
            now.saturating_duration_since(self.last_flush) >= self.policy.flush_interval;

        size_reached || (interval_elapsed && !self.is_empty())
    }

    /// Sensors that currently have pending rows, in sensor order.
    pub fn sensors(&self) -> Vec<SensorId> {
        self.pending.keys().cloned().collect()
    }

    /// Remove and return all pending rows of one sensor.
    pub fn take(&mut self, sensor_id: &SensorId) -> Vec<SensorEvent> {
        self.pending.remove(sensor_id).unwrap_or_default()
    }

    /// Return rows whose flush failed.
    ///
    /// They go back ahead of anything pushed since they were taken, so the
    /// per-sensor order is preserved for the retry.
    pub fn restore(&mut self, sensor_id: SensorId, mut rows: Vec<SensorEvent>) {
        if rows.is_empty() {
            return;
        }
        let newer = self.pending.remove(&sensor_id).unwrap_or_default();
        rows.extend(newer);
        self.pending.insert(sensor_id, rows);
    }

    /// Record the end of a flush cycle.
    pub fn mark_flushed(&mut self, now: Instant) {
        self.last_flush = now;
        self.retry_deferred = false;
    }

    /// Hold restored rows until the flush interval elapses again.
    ///
    /// Call after `mark_flushed()` when some sensor failed to persist.
    pub fn defer_retry(&mut self) {
        self.retry_deferred = true;
    }

    /// Check if the size trigger is suspended by a failed flush.
    pub fn is_retry_deferred(&self) -> bool {
        self.retry_deferred
    }

    /// Number of pending rows for one sensor.
    pub fn pending_for(&self, sensor_id: &SensorId) -> usize {
        self.pending.get(sensor_id).map_or(0, Vec::len)
    }

    /// Total pending rows across all sensors.
    pub fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Check if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
