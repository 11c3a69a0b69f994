//! CLI command implementations.

pub mod decode;
pub mod export;
pub mod record;
pub mod status;
pub mod sync;

use anyhow::{Context, Result};
use std::sync::Arc;
use wearsync_client::{Config, SqliteStore};
use wearsync_types::SensorId;

/// Open the sample database named by the configuration.
pub async fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::new(&config.storage.database)
        .await
        .with_context(|| {
            format!(
                "Failed to open database {}",
                config.storage.database.display()
            )
        })?;
    Ok(Arc::new(store))
}

/// Configured sensors, or every sensor with stored rows when none are
/// configured.
pub async fn known_sensors(config: &Config, store: &SqliteStore) -> Result<Vec<SensorId>> {
    if !config.sensors.ids.is_empty() {
        return Ok(config.sensors.sensor_ids());
    }
    store.sensors().await.context("Failed to list sensors")
}
