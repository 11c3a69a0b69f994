//! Identity and ordering types for wearsync.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of a sensor stream (e.g. `"temp"`, `"hr"`, `"accel"`).
///
/// Each sensor stream has its own collection in the durable store and
/// its chunks never mix rows from other streams.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorId(String);

impl SensorId {
    /// Create a SensorId from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the id fits on its own wire line: non-blank, no line breaks.
    pub fn is_wire_safe(&self) -> bool {
        !self.0.trim().is_empty() && !self.0.contains(['\n', '\r'])
    }
}

impl From<&str> for SensorId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SensorId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensorId({})", self.0)
    }
}

/// A unique identifier for one chunk transfer attempt.
///
/// UUID v4 format (128 random bits), so collisions are practically impossible.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(uuid::Uuid);

impl BatchId {
    /// Create a new random BatchId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse a BatchId from its hyphenated string form.
    pub fn parse(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(Self)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BatchId({})", self.0)
    }
}

/// A point in time as Unix epoch milliseconds.
///
/// Sample timestamps come from the capturing device; they order rows within
/// a sensor stream and bound the paging and delete ranges.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The Unix epoch. An absent sync cursor is treated as this value.
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Create a Timestamp from epoch milliseconds.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Epoch milliseconds.
    pub fn as_millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_breaks_are_not_wire_safe() {
        assert!(SensorId::from("skin_temp").is_wire_safe());
        assert!(!SensorId::from("hr\nBATCH:x").is_wire_safe());
        assert!(!SensorId::from("hr\r").is_wire_safe());
        assert!(!SensorId::from("  ").is_wire_safe());
    }

    #[test]
    fn sensor_id_display_is_raw_string() {
        let id = SensorId::from("temp");
        assert_eq!(id.to_string(), "temp");
        assert_eq!(id.as_str(), "temp");
    }

    #[test]
    fn sensor_id_serializes_transparently() {
        let id = SensorId::from("hr");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"hr\"");
    }

    #[test]
    fn batch_ids_are_unique() {
        let a = BatchId::new();
        let b = BatchId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn batch_id_parses_its_display_form() {
        let original = BatchId::new();
        let parsed = BatchId::parse(&original.to_string()).unwrap();
        assert_eq!(original, parsed);
        assert!(BatchId::parse("not-a-uuid").is_none());
    }

    #[test]
    fn timestamp_ordering() {
        let t1 = Timestamp::from_millis(100);
        let t2 = Timestamp::from_millis(200);
        assert!(t1 < t2);
        assert_eq!(Timestamp::EPOCH.as_millis(), 0);
    }

    #[test]
    fn timestamp_now_is_after_epoch() {
        assert!(Timestamp::now() > Timestamp::EPOCH);
    }
}
