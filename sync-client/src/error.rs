//! Error types for sync-client.

use std::path::PathBuf;

use crate::ingest::IngestError;

/// Main error type for sync-client operations.
///
/// Sync runs never return this: their failures are folded into a
/// `SyncOutcome`. It covers the ingestion lifecycle of a context.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Ingestion error.
    #[error("ingestion error: {0}")]
    Ingest(#[from] IngestError),

    /// The context has not been started.
    #[error("sync context not started")]
    NotStarted,
}

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Event fields could not be encoded or decoded.
    #[error("field encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The store rejected the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

/// Result type alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
