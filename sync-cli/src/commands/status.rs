//! Show sync status.

use anyhow::{Context, Result};
use wearsync_client::{Config, CursorStore, SensorStore};
use wearsync_types::Timestamp;

use super::{known_sensors, open_store};

/// Run the status command.
pub async fn run(config: &Config) -> Result<()> {
    println!("=== wearsync status ===");
    println!();

    let store = open_store(config).await?;

    println!("Storage:");
    println!("  Database: {}", config.storage.database.display());
    println!();

    let sensors = known_sensors(config, &store).await?;
    println!("Pending rows:");
    if sensors.is_empty() {
        println!("  (no sensors configured or recorded)");
    }
    let mut total = 0;
    for sensor in &sensors {
        let count = store
            .count(sensor)
            .await
            .with_context(|| format!("Failed to count rows of {}", sensor))?;
        total += count;
        println!("  {:<12} {}", sensor.as_str(), count);
    }
    println!();

    println!("Sync:");
    match store.get().await.context("Failed to read sync cursor")? {
        Some(cursor) => println!("  Last sync: {}", format_timestamp(cursor)),
        None => println!("  Last sync: never"),
    }
    println!("  Chunk size: {} rows", config.sync.page_limit);
    if total > 0 {
        let chunks = total.div_ceil(config.sync.page_limit as u64);
        println!("  Next sync:  about {} chunk(s)", chunks);
    }

    Ok(())
}

/// Format a timestamp relative to now.
fn format_timestamp(ts: Timestamp) -> String {
    let now = Timestamp::now().as_millis();
    let diff = now.saturating_sub(ts.as_millis()).max(0) / 1000;

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wearsync_types::{SensorEvent, SensorId};

    fn config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.storage.database = dir.join("wearsync.db");
        config
    }

    #[tokio::test]
    async fn status_on_empty_store() {
        let dir = tempdir().unwrap();
        assert!(run(&config(dir.path())).await.is_ok());
    }

    #[tokio::test]
    async fn status_with_rows_and_cursor() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let store = open_store(&config).await.unwrap();
        store
            .append(
                &SensorId::from("hr"),
                &[SensorEvent::new("hr", Timestamp::from_millis(1))],
            )
            .await
            .unwrap();
        store.set(Timestamp::now()).await.unwrap();

        assert!(run(&config).await.is_ok());
    }

    #[test]
    fn format_timestamp_works() {
        let now = Timestamp::now().as_millis();

        assert_eq!(format_timestamp(Timestamp::from_millis(now)), "just now");
        assert!(format_timestamp(Timestamp::from_millis(now - 120_000)).contains("minutes"));
        assert!(format_timestamp(Timestamp::from_millis(now - 7_200_000)).contains("hours"));
        assert!(format_timestamp(Timestamp::from_millis(now - 172_800_000)).contains("days"));
    }
}
