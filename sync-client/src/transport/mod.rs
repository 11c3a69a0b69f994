//! Transport abstraction for wearsync.
//!
//! This module provides a pluggable message channel to the companion host
//! (spool directory, mock for testing).
//!
//! # Design
//!
//! The transport is a keyed, fire-and-acknowledge channel:
//! - `is_peer_reachable()` is checked once at the start of a sync run
//! - `send()` delivers one encoded chunk; `Ok` is the acknowledgment that
//!   allows the chunk's rows to be deleted
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! if transport.is_peer_reachable().await {
//!     transport.send("sensor_data", &chunk_bytes).await?;
//! }
//! ```

mod mock;
mod spool;

pub use mock::{MockTransport, SentMessage};
pub use spool::SpoolTransport;

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Peer is not reachable.
    #[error("peer unreachable")]
    Unreachable,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// I/O error writing the chunk.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport trait for delivering encoded chunks to the host.
///
/// Implementations handle the underlying channel (spool directory, mock,
/// a wearable data layer, etc).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the host can currently be reached.
    async fn is_peer_reachable(&self) -> bool;

    /// Send one payload under the given key.
    ///
    /// Returns only after the payload was accepted.
    async fn send(&self, key: &str, payload: &[u8]) -> Result<(), TransportError>;
}
