//! Per-sensor sequencing of store writes and sync deletes.
//!
//! The ingestion consumer takes a sensor's lock around each append; the
//! controller holds it from reading a page until that page's range is
//! deleted. A sample flushed while its sensor's chunk is in flight lands
//! after the delete, so it can never be removed unsent.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use wearsync_types::SensorId;

/// Shared registry of per-sensor locks. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct SensorLocks {
    inner: Arc<Mutex<HashMap<SensorId, Arc<Mutex<()>>>>>,
}

impl SensorLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one sensor's collection.
    pub async fn lock(&self, sensor_id: &SensorId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            Arc::clone(locks.entry(sensor_id.clone()).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_sensor_is_exclusive() {
        let locks = SensorLocks::new();
        let temp = SensorId::from("temp");

        let held = locks.lock(&temp).await;
        let waiting = tokio::time::timeout(Duration::from_millis(50), locks.lock(&temp)).await;
        assert!(waiting.is_err());

        drop(held);
        let _again = locks.lock(&temp).await;
    }

    #[tokio::test]
    async fn sensors_are_independent() {
        let locks = SensorLocks::new();
        let _temp = locks.lock(&SensorId::from("temp")).await;

        let hr = tokio::time::timeout(Duration::from_millis(50), locks.lock(&SensorId::from("hr")))
            .await;
        assert!(hr.is_ok());
    }

    #[tokio::test]
    async fn clones_share_locks() {
        let locks = SensorLocks::new();
        let other = locks.clone();
        let temp = SensorId::from("temp");

        let _held = locks.lock(&temp).await;
        let waiting = tokio::time::timeout(Duration::from_millis(50), other.lock(&temp)).await;
        assert!(waiting.is_err());
    }
}
