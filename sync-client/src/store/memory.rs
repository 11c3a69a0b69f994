//! In-memory stores for testing.
//!
//! Both stores share their state across clones, record what was done to
//! them and allow forcing the next operation to fail.

use super::{CursorStore, SensorStore};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use wearsync_types::{SensorEvent, SensorId, Timestamp};

/// One recorded store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Rows appended.
    Append {
        /// Sensor written.
        sensor_id: SensorId,
        /// Rows in the append.
        rows: usize,
    },
    /// Page read.
    Read {
        /// Sensor read.
        sensor_id: SensorId,
        /// Exclusive lower bound.
        since: Timestamp,
        /// Rows returned.
        returned: usize,
    },
    /// Slice of one timestamp group read.
    ReadAt {
        /// Sensor read.
        sensor_id: SensorId,
        /// Timestamp of the group.
        at: Timestamp,
        /// Rows of the group skipped.
        offset: usize,
        /// Rows returned.
        returned: usize,
    },
    /// Range deleted.
    Delete {
        /// Sensor deleted from.
        sensor_id: SensorId,
        /// Inclusive upper bound.
        up_to: Timestamp,
        /// Rows removed.
        removed: u64,
    },
}

/// In-memory sample store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    rows: HashMap<SensorId, Vec<SensorEvent>>,
    ops: Vec<StoreOp>,
    append_attempts: usize,
    fail_appends: Option<String>,
    fail_next_append: Option<String>,
    fail_next_read: Option<String>,
    fail_next_delete: Option<String>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation so far, in order.
    pub fn ops(&self) -> Vec<StoreOp> {
        self.inner.lock().unwrap().ops.clone()
    }

    /// Timestamps currently stored for a sensor.
    pub fn timestamps(&self, sensor_id: &SensorId) -> Vec<i64> {
        let inner = self.inner.lock().unwrap();
        inner
            .rows
            .get(sensor_id)
            .map(|rows| rows.iter().map(|r| r.timestamp.as_millis()).collect())
            .unwrap_or_default()
    }

    /// Cause the next append() to fail with the given error.
    pub fn fail_next_append(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_append = Some(error.to_string());
    }

    /// Cause every append() to fail until called again with `None`.
    pub fn fail_appends(&self, error: Option<&str>) {
        self.inner.lock().unwrap().fail_appends = error.map(str::to_string);
    }

    /// Number of append() calls, failed ones included.
    pub fn append_attempts(&self) -> usize {
        self.inner.lock().unwrap().append_attempts
    }

    /// Cause the next read_since() to fail with the given error.
    pub fn fail_next_read(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_read = Some(error.to_string());
    }

    /// Cause the next delete_up_to() to fail with the given error.
    pub fn fail_next_delete(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_delete = Some(error.to_string());
    }
}

#[async_trait]
impl SensorStore for MemoryStore {
    async fn append(&self, sensor_id: &SensorId, rows: &[SensorEvent]) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.append_attempts += 1;
        if let Some(error) = inner
            .fail_next_append
            .take()
            .or_else(|| inner.fail_appends.clone())
        {
            return Err(StoreError::Unavailable(error));
        }

        let stored = inner.rows.entry(sensor_id.clone()).or_default();
        for row in rows {
            let at = stored.partition_point(|r| r.timestamp <= row.timestamp);
            stored.insert(at, row.clone());
        }
        inner.ops.push(StoreOp::Append {
            sensor_id: sensor_id.clone(),
            rows: rows.len(),
        });
        Ok(())
    }

    async fn read_since(
        &self,
        sensor_id: &SensorId,
        since: Timestamp,
        limit: usize,
    ) -> StoreResult<Vec<SensorEvent>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_read.take() {
            return Err(StoreError::Unavailable(error));
        }

        let page: Vec<SensorEvent> = inner
            .rows
            .get(sensor_id)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.timestamp > since)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        inner.ops.push(StoreOp::Read {
            sensor_id: sensor_id.clone(),
            since,
            returned: page.len(),
        });
        Ok(page)
    }

    async fn read_at(
        &self,
        sensor_id: &SensorId,
        at: Timestamp,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<SensorEvent>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_read.take() {
            return Err(StoreError::Unavailable(error));
        }

        let rows: Vec<SensorEvent> = inner
            .rows
            .get(sensor_id)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.timestamp == at)
                    .skip(offset)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        inner.ops.push(StoreOp::ReadAt {
            sensor_id: sensor_id.clone(),
            at,
            offset,
            returned: rows.len(),
        });
        Ok(rows)
    }

    async fn count_at(&self, sensor_id: &SensorId, at: Timestamp) -> StoreResult<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.rows.get(sensor_id).map_or(0, |rows| {
            rows.iter().filter(|r| r.timestamp == at).count() as u64
        }))
    }

    async fn delete_up_to(&self, sensor_id: &SensorId, up_to: Timestamp) -> StoreResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_delete.take() {
            return Err(StoreError::Unavailable(error));
        }

        let removed = match inner.rows.get_mut(sensor_id) {
            Some(rows) => {
                let before = rows.len();
                rows.retain(|r| r.timestamp > up_to);
                (before - rows.len()) as u64
            }
            None => 0,
        };
        inner.ops.push(StoreOp::Delete {
            sensor_id: sensor_id.clone(),
            up_to,
            removed,
        });
        Ok(removed)
    }

    async fn count(&self, sensor_id: &SensorId) -> StoreResult<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.rows.get(sensor_id).map_or(0, |rows| rows.len() as u64))
    }

    async fn read_all(&self, sensor_id: &SensorId) -> StoreResult<Vec<SensorEvent>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.rows.get(sensor_id).cloned().unwrap_or_default())
    }

    async fn delete_all(&self, sensor_id: &SensorId) -> StoreResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .rows
            .remove(sensor_id)
            .map_or(0, |rows| rows.len() as u64))
    }
}

/// In-memory cursor store.
#[derive(Debug, Default, Clone)]
pub struct MemoryCursorStore {
    inner: Arc<Mutex<MemoryCursorInner>>,
}

#[derive(Debug, Default)]
struct MemoryCursorInner {
    cursor: Option<Timestamp>,
    writes: usize,
    fail_next_set: Option<String>,
}

impl MemoryCursorStore {
    /// Create an empty cursor store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cursor store holding an existing watermark.
    pub fn with_cursor(cursor: Timestamp) -> Self {
        let store = Self::default();
        store.inner.lock().unwrap().cursor = Some(cursor);
        store
    }

    /// How many times set() succeeded.
    pub fn writes(&self) -> usize {
        self.inner.lock().unwrap().writes
    }

    /// Cause the next set() to fail with the given error.
    pub fn fail_next_set(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_set = Some(error.to_string());
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get(&self) -> StoreResult<Option<Timestamp>> {
        Ok(self.inner.lock().unwrap().cursor)
    }

    async fn set(&self, cursor: Timestamp) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_set.take() {
            return Err(StoreError::Unavailable(error));
        }
        inner.cursor = Some(cursor);
        inner.writes += 1;
        Ok(())
    }
}
