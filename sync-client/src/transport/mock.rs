//! Mock transport for testing.
//!
//! Captures sent payloads and allows toggling reachability and forcing
//! send failures.

use super::{Transport, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A payload accepted by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Key it was sent under.
    pub key: String,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

/// Mock transport for testing.
///
/// Reachable by default. Clones share state.
#[derive(Debug)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    reachable: bool,
    sent_messages: Vec<SentMessage>,
    send_attempts: usize,
    fail_next_send: Option<String>,
    fail_on_attempt: HashMap<usize, String>,
}

impl MockTransport {
    /// Create a new, reachable mock transport.
    pub fn new() -> Self {
        let inner = MockTransportInner {
            reachable: true,
            ..Default::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Create a mock whose peer is out of range.
    pub fn unreachable() -> Self {
        let transport = Self::new();
        transport.set_reachable(false);
        transport
    }

    /// Toggle peer reachability.
    pub fn set_reachable(&self, reachable: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.reachable = reachable;
    }

    /// Get all messages that were accepted.
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        let inner = self.inner.lock().unwrap();
        inner.sent_messages.clone()
    }

    /// Get the payloads that were accepted, as UTF-8 text.
    pub fn sent_text(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .sent_messages
            .iter()
            .map(|m| String::from_utf8_lossy(&m.payload).into_owned())
            .collect()
    }

    /// Get the last accepted message.
    pub fn last_sent(&self) -> Option<SentMessage> {
        let inner = self.inner.lock().unwrap();
        inner.sent_messages.last().cloned()
    }

    /// Number of send() calls, failed ones included.
    pub fn send_attempts(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.send_attempts
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = Some(error.to_string());
    }

    /// Cause the `attempt`-th send() (1-based, counting every call) to fail.
    pub fn fail_send_attempt(&self, attempt: usize, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_on_attempt.insert(attempt, error.to_string());
    }

    /// Clear captured messages and injected failures.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockTransportInner {
            reachable: true,
            ..Default::default()
        };
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn is_peer_reachable(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.reachable
    }

    async fn send(&self, key: &str, payload: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.send_attempts += 1;

        if !inner.reachable {
            return Err(TransportError::Unreachable);
        }

        // Check for forced failure
        let attempt = inner.send_attempts;
        if let Some(error) = inner.fail_on_attempt.remove(&attempt) {
            return Err(TransportError::SendFailed(error));
        }
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner.sent_messages.push(SentMessage {
            key: key.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}
