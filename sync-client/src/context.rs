//! Explicit engine context.
//!
//! [`SyncContext`] owns everything a running device needs: the ingestion
//! consumer, the controller and the optional periodic sync task. Nothing
//! is global; a context is started and stopped explicitly.

use crate::config::Config;
use crate::controller::{CancelHandle, SyncController};
use crate::error::ClientError;
use crate::ingest::{spawn_ingestion, FlushReport, IngestHandle, IngestTask};
use crate::scheduler::spawn_periodic_sync;
use crate::store::{CursorStore, SensorStore};
use crate::transport::Transport;
use std::sync::Arc;
use tokio::task::JoinHandle;
use wearsync_core::SyncOutcome;
use wearsync_types::SensorEvent;

struct Running {
    ingest: IngestHandle,
    task: IngestTask,
    periodic: Option<JoinHandle<()>>,
}

/// A wearsync engine instance.
pub struct SyncContext<T, S, C> {
    config: Config,
    store: Arc<S>,
    controller: Arc<SyncController<T, S, C>>,
    running: Option<Running>,
}

impl<T, S, C> SyncContext<T, S, C>
where
    T: Transport + 'static,
    S: SensorStore + 'static,
    C: CursorStore + 'static,
{
    /// Create a stopped context.
    pub fn new(config: Config, transport: T, store: Arc<S>, cursor_store: Arc<C>) -> Self {
        let controller = Arc::new(SyncController::new(
            Arc::new(transport),
            Arc::clone(&store),
            cursor_store,
            config.sensors.sensor_ids(),
            &config.sync,
        ));
        Self {
            config,
            store,
            controller,
            running: None,
        }
    }

    /// Start ingestion and, if configured, periodic sync.
    ///
    /// Starting a running context only returns another producer handle.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> IngestHandle {
        if let Some(running) = &self.running {
            return running.ingest.clone();
        }

        let (ingest, task) = spawn_ingestion(
            Arc::clone(&self.store),
            &self.config.ingest,
            self.controller.sensor_locks(),
        );
        let periodic = self
            .config
            .sync
            .interval()
            .map(|period| spawn_periodic_sync(Arc::clone(&self.controller), period));
        tracing::info!(
            sensors = self.controller.sensors().len(),
            periodic = periodic.is_some(),
            "Sync context started"
        );

        self.running = Some(Running {
            ingest: ingest.clone(),
            task,
            periodic,
        });
        ingest
    }

    /// Check if the context is started.
    pub fn is_started(&self) -> bool {
        self.running.is_some()
    }

    /// Submit one sample. Never blocks.
    pub fn submit(&self, event: SensorEvent) -> Result<(), ClientError> {
        let running = self.running.as_ref().ok_or(ClientError::NotStarted)?;
        running.ingest.submit(event)?;
        Ok(())
    }

    /// Run one sync pass now.
    pub async fn sync_now(&self) -> SyncOutcome {
        self.controller.run().await
    }

    /// Handle for cancelling the running sync.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.controller.cancel_handle()
    }

    /// The controller, for callers that drive sync themselves.
    pub fn controller(&self) -> &Arc<SyncController<T, S, C>> {
        &self.controller
    }

    /// The sample store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Stop periodic sync, drain and flush ingestion.
    ///
    /// A sync in flight is asked to stop before its next chunk.
    pub async fn stop(&mut self) -> Result<FlushReport, ClientError> {
        let running = self.running.take().ok_or(ClientError::NotStarted)?;

        if let Some(periodic) = running.periodic {
            periodic.abort();
        }
        if self.controller.is_running() {
            self.controller.cancel_handle().cancel();
        }

        let report = running.task.shutdown().await?;
        tracing::info!(
            persisted = report.persisted,
            retained = report.retained,
            "Sync context stopped"
        );
        Ok(report)
    }
}
