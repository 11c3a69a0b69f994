//! Durable storage for sync-client.
//!
//! Two collaborators live here:
//! - [`SensorStore`]: per-sensor, timestamp-ordered sample rows
//! - [`CursorStore`]: the single persisted sync watermark

mod memory;
mod sqlite;

pub use memory::{MemoryCursorStore, MemoryStore, StoreOp};
pub use sqlite::SqliteStore;

use crate::error::StoreResult;
use async_trait::async_trait;
use wearsync_types::{SensorEvent, SensorId, Timestamp};

/// Trait for sample storage backends.
///
/// Each sensor is an independent collection ordered by timestamp. Rows with
/// equal timestamps keep their append order.
#[async_trait]
pub trait SensorStore: Send + Sync {
    /// Append rows to a sensor's collection in one operation.
    async fn append(&self, sensor_id: &SensorId, rows: &[SensorEvent]) -> StoreResult<()>;

    /// Read up to `limit` rows with timestamp strictly greater than `since`,
    /// ascending.
    async fn read_since(
        &self,
        sensor_id: &SensorId,
        since: Timestamp,
        limit: usize,
    ) -> StoreResult<Vec<SensorEvent>>;

    /// Read up to `limit` rows stamped exactly `at`, skipping the first
    /// `offset` of them, in append order.
    async fn read_at(
        &self,
        sensor_id: &SensorId,
        at: Timestamp,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<SensorEvent>>;

    /// Number of rows stamped exactly `at`.
    async fn count_at(&self, sensor_id: &SensorId, at: Timestamp) -> StoreResult<u64>;

    /// Delete every row with timestamp at or before `up_to`.
    ///
    /// Returns the number of rows removed.
    async fn delete_up_to(&self, sensor_id: &SensorId, up_to: Timestamp) -> StoreResult<u64>;

    /// Number of rows stored for a sensor.
    async fn count(&self, sensor_id: &SensorId) -> StoreResult<u64>;

    /// Every row of a sensor, ascending.
    async fn read_all(&self, sensor_id: &SensorId) -> StoreResult<Vec<SensorEvent>>;

    /// Remove every row of a sensor. Returns the number removed.
    async fn delete_all(&self, sensor_id: &SensorId) -> StoreResult<u64>;
}

/// Trait for the persisted sync watermark.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Last successful sync time, if any run ever completed.
    async fn get(&self) -> StoreResult<Option<Timestamp>>;

    /// Persist a new watermark.
    async fn set(&self, cursor: Timestamp) -> StoreResult<()>;
}
