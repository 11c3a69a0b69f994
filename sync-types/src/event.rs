//! Sensor samples and their CSV row encoding.

use serde::{Deserialize, Serialize};

use crate::{SensorId, Timestamp};

/// Capability of a row type that can be written into a wire chunk.
///
/// A row exposes its header fields and its values in header order. The
/// timestamp is the only field the sync engine interprets: it orders rows,
/// bounds pages and drives range deletion.
pub trait CsvSerializable {
    /// Capture time of this row.
    fn timestamp(&self) -> Timestamp;

    /// Column names, in order.
    fn header_fields(&self) -> Vec<String>;

    /// Column values, in the same order as [`header_fields`](Self::header_fields).
    fn field_values(&self) -> Vec<String>;

    /// The header row as a single CSV line (no terminator).
    fn csv_header(&self) -> String {
        join_cells(self.header_fields())
    }

    /// The data row as a single CSV line (no terminator).
    fn csv_row(&self) -> String {
        join_cells(self.field_values())
    }
}

/// Quote a CSV cell if it contains a separator, quote or line break.
///
/// Plain cells pass through untouched so ordinary rows stay byte-identical
/// to an unquoted encoding.
pub fn escape_cell(cell: &str) -> std::borrow::Cow<'_, str> {
    if cell.contains([',', '"', '\n', '\r']) {
        std::borrow::Cow::Owned(format!("\"{}\"", cell.replace('"', "\"\"")))
    } else {
        std::borrow::Cow::Borrowed(cell)
    }
}

fn join_cells(cells: Vec<String>) -> String {
    cells
        .iter()
        .map(|c| escape_cell(c))
        .collect::<Vec<_>>()
        .join(",")
}

/// One named value of a sample. Opaque to the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Value rendered as text.
    pub value: String,
}

impl Field {
    /// Create a field.
    pub fn new(name: impl Into<String>, value: impl ToString) -> Self {
        Self {
            name: name.into(),
            value: value.to_string(),
        }
    }
}

/// A single sample captured by a sensor producer.
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorEvent {
    /// Stream this sample belongs to.
    pub sensor_id: SensorId,
    /// Capture time.
    pub timestamp: Timestamp,
    /// Sensor-specific payload, in column order.
    pub fields: Vec<Field>,
}

impl SensorEvent {
    /// Create a sample with no payload fields.
    pub fn new(sensor_id: impl Into<SensorId>, timestamp: Timestamp) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp,
            fields: Vec::new(),
        }
    }

    /// Append a payload field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push(Field::new(name, value));
        self
    }
}

impl CsvSerializable for SensorEvent {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn header_fields(&self) -> Vec<String> {
        std::iter::once("timestamp".to_string())
            .chain(self.fields.iter().map(|f| f.name.clone()))
            .collect()
    }

    fn field_values(&self) -> Vec<String> {
        std::iter::once(self.timestamp.to_string())
            .chain(self.fields.iter().map(|f| f.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skin_temperature(ts: i64) -> SensorEvent {
        SensorEvent::new("skin_temp", Timestamp::from_millis(ts))
            .with_field("ambientTemp", 21.5)
            .with_field("objectTemp", 33.25)
            .with_field("status", 0)
    }

    #[test]
    fn header_starts_with_timestamp() {
        let event = skin_temperature(1000);
        assert_eq!(
            event.csv_header(),
            "timestamp,ambientTemp,objectTemp,status"
        );
    }

    #[test]
    fn row_values_follow_header_order() {
        let event = skin_temperature(1000);
        assert_eq!(event.csv_row(), "1000,21.5,33.25,0");
    }

    #[test]
    fn cells_with_separators_are_quoted() {
        let event = SensorEvent::new("notes", Timestamp::from_millis(5))
            .with_field("text", "a,b")
            .with_field("quote", "say \"hi\"")
            .with_field("multiline", "x\ny");
        assert_eq!(
            event.csv_row(),
            "5,\"a,b\",\"say \"\"hi\"\"\",\"x\ny\""
        );
    }

    #[test]
    fn event_without_fields_has_timestamp_column_only() {
        let event = SensorEvent::new("step", Timestamp::from_millis(42));
        assert_eq!(event.csv_header(), "timestamp");
        assert_eq!(event.csv_row(), "42");
    }

    #[test]
    fn event_json_roundtrip_keeps_field_order() {
        let event = skin_temperature(7);
        let json = serde_json::to_string(&event).unwrap();
        let restored: SensorEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, event);
        assert_eq!(restored.fields[0].name, "ambientTemp");
    }
}
