//! Configuration management for the wearsync CLI.

use anyhow::{Context, Result};
use std::path::Path;
use wearsync_client::Config;

/// Name of the configuration file looked up in the data directory.
pub const CONFIG_FILE: &str = "wearsync.toml";

/// Load the configuration.
///
/// An explicit path must exist. Without one, `<data_dir>/wearsync.toml` is
/// used if present, otherwise the defaults. A relative database path is
/// resolved against the data directory.
pub fn load(data_dir: &Path, explicit: Option<&Path>) -> Result<Config> {
    let mut config = match explicit {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => {
            let path = data_dir.join(CONFIG_FILE);
            if path.exists() {
                Config::from_file(&path)
                    .with_context(|| format!("Failed to load {}", path.display()))?
            } else {
                Config::default()
            }
        }
    };

    if config.storage.database.is_relative() {
        config.storage.database = data_dir.join(&config.storage.database);
    }
    Ok(config)
}
