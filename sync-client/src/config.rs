//! Configuration loading for sync-client.
//!
//! Configuration is loaded from a TOML file (default: `wearsync.toml`).
//! Every section and field may be omitted and falls back to its default.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use wearsync_core::FlushPolicy;
use wearsync_types::SensorId;

/// Root configuration for a wearsync device.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Ingestion buffer configuration.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Sync run configuration.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Sensor streams, in sync order.
    #[serde(default)]
    pub sensors: SensorsConfig,
}

/// Ingestion buffer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Rows per sensor that trigger an immediate flush (default: 100).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum time between flushes in milliseconds (default: 10000).
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// How long the consumer waits on an empty queue before re-checking
    /// the flush interval, in milliseconds (default: 100).
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,
}

/// Sync run configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Maximum rows per chunk (default: 500).
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    /// Key every chunk is sent under (default: "sensor_data").
    #[serde(default = "default_transport_key")]
    pub transport_key: String,
    /// Periodic sync interval in seconds; 0 disables it (default: 0).
    #[serde(default)]
    pub interval_secs: u64,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// Sensor stream configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SensorsConfig {
    /// Sensor ids. Sync visits them in this order.
    #[serde(default)]
    pub ids: Vec<String>,
}

// Default value functions
fn default_batch_size() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    10_000
}

fn default_idle_wait_ms() -> u64 {
    100
}

fn default_page_limit() -> usize {
    500
}

fn default_transport_key() -> String {
    "sensor_data".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("wearsync.db")
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            idle_wait_ms: default_idle_wait_ms(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
            transport_key: default_transport_key(),
            interval_secs: 0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl IngestConfig {
    /// Flush policy for the pending buffer.
    pub fn policy(&self) -> FlushPolicy {
        FlushPolicy::new(self.batch_size, Duration::from_millis(self.flush_interval_ms))
    }

    /// Idle wait of the consumer loop.
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

impl SyncConfig {
    /// Periodic sync interval, if enabled.
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

impl SensorsConfig {
    /// Configured sensors as typed ids, in sync order.
    pub fn sensor_ids(&self) -> Vec<SensorId> {
        self.ids.iter().map(|id| SensorId::new(id.as_str())).collect()
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingest.batch_size == 0 {
            return Err(ConfigError::invalid("ingest.batch_size", "must be at least 1"));
        }
        if self.ingest.idle_wait_ms == 0 {
            return Err(ConfigError::invalid("ingest.idle_wait_ms", "must be at least 1"));
        }
        if self.sync.page_limit == 0 {
            return Err(ConfigError::invalid("sync.page_limit", "must be at least 1"));
        }
        if self.sync.transport_key.is_empty() {
            return Err(ConfigError::invalid("sync.transport_key", "must not be empty"));
        }
        if let Some(id) = self
            .sensors
            .ids
            .iter()
            .find(|id| !SensorId::new(id.as_str()).is_wire_safe())
        {
            return Err(ConfigError::invalid(
                "sensors.ids",
                format!("sensor id {:?} is blank or contains a line break", id),
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
