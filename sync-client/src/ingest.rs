//! Ingestion buffer task.
//!
//! Producers call [`IngestHandle::submit`], which never blocks: events go
//! onto an unbounded channel. A single consumer task owns the
//! [`PendingBuffer`], waits for events with a bounded idle wait, and
//! flushes per sensor into the [`SensorStore`] whenever the flush policy
//! says so.
//!
//! Each append holds the sensor's [`SensorLocks`] entry, so a flush never
//! interleaves with a sync page of the same sensor. A failed flush keeps
//! its rows and retries on the flush interval.
//!
//! Shutdown drains the channel, runs a final flush and reports what could
//! not be persisted.

use crate::config::IngestConfig;
use crate::locks::SensorLocks;
use crate::store::SensorStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use wearsync_core::PendingBuffer;
use wearsync_types::SensorEvent;

/// Ingestion errors.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The consumer has shut down.
    #[error("ingestion buffer is closed")]
    Closed,

    /// The consumer task panicked or was aborted.
    #[error("ingestion task failed: {0}")]
    TaskFailed(String),
}

/// What the consumer persisted over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Rows written to the store.
    pub persisted: usize,
    /// Rows still buffered at shutdown because their final flush failed.
    /// These are lost.
    pub retained: usize,
}

/// Producer side of the ingestion buffer. Cheap to clone.
#[derive(Debug, Clone)]
pub struct IngestHandle {
    tx: mpsc::UnboundedSender<SensorEvent>,
}

impl IngestHandle {
    /// Enqueue an event. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Closed`] once the consumer has shut down.
    pub fn submit(&self, event: SensorEvent) -> Result<(), IngestError> {
        self.tx.send(event).map_err(|_| IngestError::Closed)
    }

    /// Whether the consumer still accepts events.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Consumer side of the ingestion buffer.
#[derive(Debug)]
pub struct IngestTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<FlushReport>,
}

impl IngestTask {
    /// Stop accepting events, drain and flush what is queued, and wait for
    /// the consumer to finish.
    pub async fn shutdown(self) -> Result<FlushReport, IngestError> {
        // The consumer may already have stopped because every handle was dropped.
        let _ = self.shutdown.send(());
        self.handle
            .await
            .map_err(|e| IngestError::TaskFailed(e.to_string()))
    }
}

/// Spawn the ingestion consumer.
///
/// `locks` must be the registry the controller syncing the same store uses.
/// Must be called from within a tokio runtime.
pub fn spawn_ingestion<S>(
    store: Arc<S>,
    config: &IngestConfig,
    locks: SensorLocks,
) -> (IngestHandle, IngestTask)
where
    S: SensorStore + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let consumer = Consumer {
        store,
        locks,
        buffer: PendingBuffer::new(config.policy(), Instant::now().into_std()),
        idle_wait: config.idle_wait(),
        rx,
        report: FlushReport::default(),
    };
    let handle = tokio::spawn(consumer.run(shutdown_rx));

    (
        IngestHandle { tx },
        IngestTask {
            shutdown: shutdown_tx,
            handle,
        },
    )
}

struct Consumer<S> {
    store: Arc<S>,
    locks: SensorLocks,
    buffer: PendingBuffer,
    idle_wait: Duration,
    rx: mpsc::UnboundedReceiver<SensorEvent>,
    report: FlushReport,
}

impl<S: SensorStore> Consumer<S> {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> FlushReport {
        tracing::debug!(
            batch_size = self.buffer.policy().batch_size,
            "Ingestion consumer started"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                received = tokio::time::timeout(self.idle_wait, self.rx.recv()) => match received {
                    Ok(Some(event)) => self.buffer.push(event),
                    // Every producer handle is gone.
                    Ok(None) => break,
                    // Idle: fall through to the interval check.
                    Err(_) => {}
                },
            }

            if self.buffer.should_flush(Instant::now().into_std()) {
                self.flush().await;
            }
        }

        self.rx.close();
        while let Ok(event) = self.rx.try_recv() {
            self.buffer.push(event);
        }
        if !self.buffer.is_empty() {
            self.flush().await;
        }

        self.report.retained = self.buffer.len();
        if self.report.retained > 0 {
            tracing::error!(
                rows = self.report.retained,
                "Ingestion stopped with unpersisted rows"
            );
        } else {
            tracing::debug!(persisted = self.report.persisted, "Ingestion consumer stopped");
        }
        self.report
    }

    async fn flush(&mut self) {
        let mut failed = false;
        for sensor_id in self.buffer.sensors() {
            let rows = self.buffer.take(&sensor_id);
            let appended = {
                let _sensor = self.locks.lock(&sensor_id).await;
                self.store.append(&sensor_id, &rows).await
            };
            match appended {
                Ok(()) => {
                    tracing::debug!(sensor = %sensor_id, rows = rows.len(), "Flushed rows");
                    self.report.persisted += rows.len();
                }
                Err(e) => {
                    tracing::warn!(sensor = %sensor_id, rows = rows.len(), "Flush failed: {}", e);
                    self.buffer.restore(sensor_id, rows);
                    failed = true;
                }
            }
        }
        self.buffer.mark_flushed(Instant::now().into_std());
        if failed {
            self.buffer.defer_retry();
        }
    }
}
