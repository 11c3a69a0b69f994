//! Export a sensor's stored rows as CSV.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use wearsync_client::{Config, SensorStore};
use wearsync_types::{CsvSerializable, SensorEvent, SensorId};

use super::open_store;

/// Run the export command.
pub async fn run(config: &Config, sensor: &str, output: Option<&Path>, clear: bool) -> Result<()> {
    let store = open_store(config).await?;
    let sensor_id = SensorId::new(sensor);

    let rows = store
        .read_all(&sensor_id)
        .await
        .with_context(|| format!("Failed to read rows of {}", sensor))?;
    if rows.is_empty() {
        eprintln!("No stored rows for {}", sensor);
        return Ok(());
    }

    let csv = to_csv(&rows);
    match output {
        Some(path) => {
            tokio::fs::write(path, &csv)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Exported {} rows to {}", rows.len(), path.display());
        }
        None => {
            std::io::stdout()
                .write_all(csv.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }

    if clear {
        let removed = store
            .delete_all(&sensor_id)
            .await
            .with_context(|| format!("Failed to clear {}", sensor))?;
        eprintln!("Cleared {} rows of {}", removed, sensor);
    }
    Ok(())
}

/// Render rows as one CSV document. The header comes from the first row.
fn to_csv(rows: &[SensorEvent]) -> String {
    let mut out = String::new();
    if let Some(first) = rows.first() {
        out.push_str(&first.csv_header());
        out.push('\n');
    }
    for row in rows {
        out.push_str(&row.csv_row());
        out.push('\n');
    }
    out
}
