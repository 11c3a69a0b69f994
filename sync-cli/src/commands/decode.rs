//! Decode a received chunk file.

use anyhow::{Context, Result};
use std::path::Path;
use wearsync_types::ReceivedChunk;

/// Run the decode command.
pub async fn run(file: &Path, show_rows: bool) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let chunk = ReceivedChunk::from_bytes(&bytes)
        .with_context(|| format!("{} is not a valid chunk", file.display()))?;

    print!("{}", describe(&chunk, show_rows));
    Ok(())
}

fn describe(chunk: &ReceivedChunk, show_rows: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!("Batch:   {}\n", chunk.batch_id));
    out.push_str(&format!("Sensor:  {}\n", chunk.sensor_id));
    out.push_str(&format!("Since:   {}\n", chunk.since));
    match chunk.end_timestamp() {
        Some(end) => out.push_str(&format!("End:     {}\n", end)),
        None => out.push_str("End:     -\n"),
    }
    out.push_str(&format!("Records: {}\n", chunk.record_count()));
    out.push_str(&format!("Columns: {}\n", chunk.header.join(", ")));

    if show_rows {
        out.push('\n');
        for row in &chunk.rows {
            out.push_str(&row.join(" | "));
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wearsync_core::BatchEncoder;
    use wearsync_types::{SensorEvent, SensorId, Timestamp};

    fn encoded() -> Vec<u8> {
        let rows = vec![
            SensorEvent::new("hr", Timestamp::from_millis(11)).with_field("bpm", 70),
            SensorEvent::new("hr", Timestamp::from_millis(12)).with_field("bpm", 71),
        ];
        let (_, bytes) =
            BatchEncoder::encode(&SensorId::from("hr"), Timestamp::from_millis(10), rows).unwrap();
        bytes
    }

    #[test]
    fn describe_lists_metadata() {
        let chunk = ReceivedChunk::from_bytes(&encoded()).unwrap();
        let text = describe(&chunk, true);

        assert!(text.contains("Sensor:  hr\n"));
        assert!(text.contains("Since:   10\n"));
        assert!(text.contains("End:     12\n"));
        assert!(text.contains("Records: 2\n"));
        assert!(text.contains("12 | 71\n"));
    }

    #[tokio::test]
    async fn decode_reads_chunk_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sensor_data.chunk");
        std::fs::write(&path, encoded()).unwrap();

        assert!(run(&path, false).await.is_ok());
    }

    #[tokio::test]
    async fn decode_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.chunk");
        std::fs::write(&path, b"not a chunk\n").unwrap();

        assert!(run(&path, false).await.is_err());
    }
}
