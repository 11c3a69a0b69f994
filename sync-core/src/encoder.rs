//! Batch encoding for wearsync.
//!
//! Turns an ordered page of same-sensor rows into one [`Chunk`] and its wire
//! bytes (format in `wearsync_types::wire`).

use thiserror::Error;
use wearsync_types::wire::{BATCH_PREFIX, DATA_MARKER, SINCE_PREFIX};
use wearsync_types::{BatchId, CsvSerializable, SensorId, Timestamp};

/// Errors produced when a page cannot be encoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Nothing to encode.
    #[error("cannot encode an empty page")]
    Empty,

    /// The sensor id would break the line framing.
    #[error("sensor id {0:?} is blank or contains a line break")]
    InvalidSensorId(String),

    /// Rows are not in ascending timestamp order.
    #[error("row {index} has timestamp {found} before previous {previous}")]
    OutOfOrder {
        /// Index of the offending row.
        index: usize,
        /// Timestamp of the row before it.
        previous: Timestamp,
        /// Timestamp of the offending row.
        found: Timestamp,
    },
}

/// One bounded transfer unit of a single sensor stream.
///
/// A chunk is a projection of durable store rows built for exactly one
/// send attempt; it is never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk<R> {
    /// Fresh random id for this attempt.
    pub batch_id: BatchId,
    /// Sensor stream of every row.
    pub sensor_id: SensorId,
    /// The run's since bound the page was read from.
    pub since: Timestamp,
    /// Highest row timestamp; the delete bound after a successful send.
    pub end: Timestamp,
    /// Number of rows.
    pub record_count: usize,
    /// When the chunk was built.
    pub created_at: Timestamp,
    /// The rows, ascending by timestamp.
    pub rows: Vec<R>,
}

/// Encoder for wire chunks.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchEncoder;

impl BatchEncoder {
    /// Encode a page into a chunk and its wire bytes.
    ///
    /// `rows` must be non-empty and ascending by timestamp. The CSV header
    /// comes from the first row.
    pub fn encode<R: CsvSerializable>(
        sensor_id: &SensorId,
        since: Timestamp,
        rows: Vec<R>,
    ) -> Result<(Chunk<R>, Vec<u8>), EncodeError> {
        if !sensor_id.is_wire_safe() {
            return Err(EncodeError::InvalidSensorId(sensor_id.as_str().to_string()));
        }
        let first = rows.first().ok_or(EncodeError::Empty)?;

        let mut end = first.timestamp();
        for (index, row) in rows.iter().enumerate().skip(1) {
            let ts = row.timestamp();
            if ts < end {
                return Err(EncodeError::OutOfOrder {
                    index,
                    previous: end,
                    found: ts,
                });
            }
            end = ts;
        }

        let batch_id = BatchId::new();
        let mut out = String::new();
        push_line(&mut out, &format!("{}{}", BATCH_PREFIX, batch_id));
        push_line(&mut out, &format!("{}{}", SINCE_PREFIX, since.as_millis()));
        push_line(&mut out, DATA_MARKER);
        push_line(&mut out, sensor_id.as_str());
        push_line(&mut out, &first.csv_header());
        for row in &rows {
            push_line(&mut out, &row.csv_row());
        }
        out.push('\n');

        let chunk = Chunk {
            batch_id,
            sensor_id: sensor_id.clone(),
            since,
            end,
            record_count: rows.len(),
            created_at: Timestamp::now(),
            rows,
        };

        Ok((chunk, out.into_bytes()))
    }
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

/// Length of the prefix of a fetched page that is safe to send and delete.
///
/// `rows` is a page read with one row of lookahead (up to `limit + 1` rows).
/// Deleting up to a chunk's `end` removes every row with that timestamp, so
/// a chunk must not stop in the middle of a run of equal timestamps: the
/// rows left behind would be deleted without being sent. When the lookahead
/// row shares the timestamp of the page's tail, the tail is trimmed and the
/// next page starts at that timestamp instead. If every row of the page
/// shares that one timestamp there is no safe cut and `limit` is returned.
pub fn complete_page_len<R: CsvSerializable>(rows: &[R], limit: usize) -> usize {
    if rows.len() <= limit {
        return rows.len();
    }
    let boundary = rows[limit].timestamp();
    match rows[..limit].iter().rposition(|r| r.timestamp() < boundary) {
        Some(idx) => idx + 1,
        None => limit,
    }
}
