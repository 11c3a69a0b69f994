//! Spool-directory transport.
//!
//! Each accepted chunk becomes one file in a directory that stands in for
//! the host's inbox (a mounted share, a USB drive, a sync folder). The
//! peer counts as reachable while the directory exists.
//!
//! File names are `<key>-<millis>-<tag>-<seq>.chunk`. The tag is random per
//! transport, so several processes spooling into one inbox in the same
//! millisecond never pick the same name.

use super::{Transport, TransportError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;
use wearsync_types::Timestamp;

/// File extension of spooled chunks.
pub const CHUNK_EXTENSION: &str = "chunk";

/// Transport that writes chunks into a directory.
#[derive(Debug)]
pub struct SpoolTransport {
    dir: PathBuf,
    tag: String,
    sequence: AtomicU64,
}

impl SpoolTransport {
    /// Create a transport spooling into `dir`.
    ///
    /// The directory is not created; a missing directory means the host
    /// is out of reach.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let mut tag = Uuid::new_v4().simple().to_string();
        tag.truncate(12);
        Self {
            dir: dir.into(),
            tag,
            sequence: AtomicU64::new(0),
        }
    }

    /// The spool directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(&self, key: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}-{:013}-{}-{:06}.{}",
            key,
            Timestamp::now().as_millis(),
            self.tag,
            seq,
            CHUNK_EXTENSION
        )
    }
}

#[async_trait]
impl Transport for SpoolTransport {
    async fn is_peer_reachable(&self) -> bool {
        tokio::fs::metadata(&self.dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    async fn send(&self, key: &str, payload: &[u8]) -> Result<(), TransportError> {
        if key.is_empty() || key.contains(['/', '\\']) {
            return Err(TransportError::SendFailed(format!("invalid key {:?}", key)));
        }

        let name = self.file_name(key);
        let final_path = self.dir.join(&name);
        let partial_path = self.dir.join(format!(".{}.partial", name));

        // Readers of the inbox only ever see complete chunk files.
        tokio::fs::write(&partial_path, payload).await?;
        if let Err(e) = tokio::fs::rename(&partial_path, &final_path).await {
            let _ = tokio::fs::remove_file(&partial_path).await;
            return Err(e.into());
        }

        tracing::debug!(file = %final_path.display(), bytes = payload.len(), "chunk spooled");
        Ok(())
    }
}
