//! Wire format of a sensor data chunk.
//!
//! A chunk is line-oriented text, every line `\n`-terminated:
//!
//! ```text
//! BATCH:<batchId>
//! SINCE:<sinceTimestampMillis>
//! ---DATA---
//! <sensorId>
//! <csv-header-row>
//! <csv-data-row-1>
//! ...
//! <csv-data-row-n>
//! <blank line>
//! ```
//!
//! The device side writes this with the batch encoder in `sync-core`.
//! [`ReceivedChunk`] is the host side: it parses the bytes back into
//! columns and rows.

use crate::{BatchId, SensorId, SyncError, Timestamp};

/// Prefix of the first line, followed by the batch id.
pub const BATCH_PREFIX: &str = "BATCH:";

/// Prefix of the second line, followed by the run's since-timestamp.
pub const SINCE_PREFIX: &str = "SINCE:";

/// Separator line between the preamble and the sensor data.
pub const DATA_MARKER: &str = "---DATA---";

/// A chunk decoded on the receiving host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedChunk {
    /// Batch id chosen by the sender for this transfer attempt.
    pub batch_id: BatchId,
    /// Lower bound (exclusive) the sender paged from.
    pub since: Timestamp,
    /// Sensor stream the rows belong to.
    pub sensor_id: SensorId,
    /// CSV header cells.
    pub header: Vec<String>,
    /// CSV data rows, each the same width as `header`.
    pub rows: Vec<Vec<String>>,
}

impl ReceivedChunk {
    /// Decode a chunk from its wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| SyncError::InvalidData(format!("chunk is not UTF-8: {}", e)))?;

        let (line, rest) = next_line(text)?;
        let batch = line
            .strip_prefix(BATCH_PREFIX)
            .ok_or_else(|| SyncError::MissingLine(BATCH_PREFIX))?;
        let batch_id = BatchId::parse(batch)
            .ok_or_else(|| SyncError::InvalidData(format!("bad batch id: {}", batch)))?;

        let (line, rest) = next_line(rest)?;
        let since = line
            .strip_prefix(SINCE_PREFIX)
            .ok_or_else(|| SyncError::MissingLine(SINCE_PREFIX))?;
        let since = since
            .parse::<i64>()
            .map(Timestamp::from_millis)
            .map_err(|_| SyncError::InvalidData(format!("bad since timestamp: {}", since)))?;

        let (line, rest) = next_line(rest)?;
        if line != DATA_MARKER {
            return Err(SyncError::MissingLine(DATA_MARKER));
        }

        let (sensor, rest) = next_line(rest)?;
        if sensor.is_empty() {
            return Err(SyncError::InvalidData("empty sensor id".into()));
        }

        let mut records = parse_records(rest)?.into_iter();
        let header = records
            .next()
            .ok_or_else(|| SyncError::InvalidData("missing CSV header".into()))?;
        let rows: Vec<Vec<String>> = records.collect();

        if let Some(bad) = rows.iter().position(|r| r.len() != header.len()) {
            return Err(SyncError::InvalidData(format!(
                "row {} has {} cells, header has {}",
                bad + 1,
                rows[bad].len(),
                header.len()
            )));
        }

        Ok(Self {
            batch_id,
            since,
            sensor_id: SensorId::new(sensor),
            header,
            rows,
        })
    }

    /// Number of data rows.
    pub fn record_count(&self) -> usize {
        self.rows.len()
    }

    /// Index of a header column by name.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// Highest value of the `timestamp` column, if the rows carry one.
    pub fn end_timestamp(&self) -> Option<Timestamp> {
        let idx = self.column("timestamp")?;
        self.rows
            .iter()
            .filter_map(|r| r[idx].parse::<i64>().ok())
            .max()
            .map(Timestamp::from_millis)
    }
}

fn next_line(text: &str) -> Result<(&str, &str), SyncError> {
    text.split_once('\n').ok_or(SyncError::Truncated)
}

/// Parse RFC 4180 records up to the terminating blank line.
fn parse_records(text: &str) -> Result<Vec<Vec<String>>, SyncError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut at_line_start = true;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    cell.push('"');
                }
                '"' => in_quotes = false,
                _ => cell.push(c),
            }
            continue;
        }

        match c {
            '\n' if at_line_start => {
                // Blank line ends the batch.
                return Ok(records);
            }
            '\n' => {
                record.push(std::mem::take(&mut cell));
                records.push(std::mem::take(&mut record));
                at_line_start = true;
            }
            '"' => {
                in_quotes = true;
                at_line_start = false;
            }
            ',' => {
                record.push(std::mem::take(&mut cell));
                at_line_start = false;
            }
            _ => {
                cell.push(c);
                at_line_start = false;
            }
        }
    }

    Err(SyncError::Truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATCH: &str = "6f1c2d9e-8a4b-4c3d-9e2f-1a2b3c4d5e6f";

    fn chunk_text(body: &str) -> String {
        format!("BATCH:{BATCH}\nSINCE:1000\n---DATA---\ntemp\n{body}\n")
    }

    #[test]
    fn parses_well_formed_chunk() {
        let text = chunk_text("timestamp,value\n1001,36.5\n1002,36.6\n");
        let chunk = ReceivedChunk::from_bytes(text.as_bytes()).unwrap();

        assert_eq!(chunk.batch_id.to_string(), BATCH);
        assert_eq!(chunk.since, Timestamp::from_millis(1000));
        assert_eq!(chunk.sensor_id, SensorId::from("temp"));
        assert_eq!(chunk.header, vec!["timestamp", "value"]);
        assert_eq!(chunk.record_count(), 2);
        assert_eq!(chunk.rows[1], vec!["1002", "36.6"]);
        assert_eq!(chunk.end_timestamp(), Some(Timestamp::from_millis(1002)));
    }

    #[test]
    fn quoted_cells_survive_separators_and_newlines() {
        let text = chunk_text("timestamp,note\n5,\"a,b\"\n6,\"x\ny \"\"q\"\"\"\n");
        let chunk = ReceivedChunk::from_bytes(text.as_bytes()).unwrap();

        assert_eq!(chunk.rows[0][1], "a,b");
        assert_eq!(chunk.rows[1][1], "x\ny \"q\"");
    }

    #[test]
    fn missing_blank_terminator_is_truncated() {
        let text = format!("BATCH:{BATCH}\nSINCE:0\n---DATA---\ntemp\ntimestamp\n1\n");
        let result = ReceivedChunk::from_bytes(text.as_bytes());
        assert!(matches!(result, Err(SyncError::Truncated)));
    }

    #[test]
    fn wrong_preamble_is_rejected() {
        let text = "BATCH:x\nSINCE:0\n---DATA---\ntemp\ntimestamp\n1\n\n";
        assert!(matches!(
            ReceivedChunk::from_bytes(text.as_bytes()),
            Err(SyncError::InvalidData(_))
        ));

        let text = format!("BATCH:{BATCH}\nFROM:0\n---DATA---\ntemp\ntimestamp\n1\n\n");
        assert!(matches!(
            ReceivedChunk::from_bytes(text.as_bytes()),
            Err(SyncError::MissingLine(SINCE_PREFIX))
        ));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let text = chunk_text("timestamp,value\n1,2,3\n");
        let result = ReceivedChunk::from_bytes(text.as_bytes());
        assert!(matches!(result, Err(SyncError::InvalidData(_))));
    }

    #[test]
    fn end_timestamp_requires_timestamp_column() {
        let text = chunk_text("time,value\n1,2\n");
        let chunk = ReceivedChunk::from_bytes(text.as_bytes()).unwrap();
        assert_eq!(chunk.end_timestamp(), None);
    }
}
