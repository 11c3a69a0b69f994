//! Error types for wearsync wire data.

use thiserror::Error;

/// Errors that can occur while decoding wearsync data.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Input ended before the chunk was complete
    #[error("chunk truncated")]
    Truncated,

    /// A required preamble line is missing or out of place
    #[error("missing {0} line")]
    MissingLine(&'static str),

    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),
}
