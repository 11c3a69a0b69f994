//! Sync transfer controller.
//!
//! Executes the [`SyncRun`] state machine against real collaborators: it
//! pages each sensor's backlog out of the [`SensorStore`], encodes it into
//! bounded chunks, sends them through the [`Transport`], deletes each
//! delivered range only after its send succeeded, and finally advances the
//! [`CursorStore`] watermark.
//!
//! At most one run is in flight per controller; a second request while one
//! runs returns [`SyncOutcome::AlreadyRunning`]. Cancellation is checked
//! between chunks, never during a send.
//!
//! A page's sensor lock (see [`SensorLocks`]) is held from its read until
//! its delete, so ingestion cannot slip a row under a range in flight.

use crate::config::SyncConfig;
use crate::locks::SensorLocks;
use crate::store::{CursorStore, SensorStore};
use crate::transport::Transport;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use wearsync_core::{
    complete_page_len, Action, BatchEncoder, Event, SyncCursor, SyncOutcome, SyncRun,
};
use wearsync_types::{SensorEvent, SensorId, Timestamp};

/// Requests cancellation of the running sync. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Ask the running sync to stop before its next chunk.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// What the last fetch prepared for sending.
enum PendingPage {
    /// One encoded chunk.
    Chunk(Vec<u8>),
    /// A timestamp group larger than the page limit, read and encoded slice
    /// by slice while it is sent.
    Group(Timestamp),
}

/// Runs sync passes from the durable store to the transport.
pub struct SyncController<T, S, C> {
    transport: Arc<T>,
    store: Arc<S>,
    cursor_store: Arc<C>,
    sensors: Vec<SensorId>,
    page_limit: usize,
    transport_key: String,
    locks: SensorLocks,
    run_guard: Mutex<()>,
    cancel: CancelHandle,
}

impl<T, S, C> SyncController<T, S, C>
where
    T: Transport,
    S: SensorStore,
    C: CursorStore,
{
    /// Create a controller over `sensors`, visited in the given order.
    pub fn new(
        transport: Arc<T>,
        store: Arc<S>,
        cursor_store: Arc<C>,
        sensors: Vec<SensorId>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            transport,
            store,
            cursor_store,
            sensors,
            page_limit: config.page_limit.max(1),
            transport_key: config.transport_key.clone(),
            locks: SensorLocks::new(),
            run_guard: Mutex::new(()),
            cancel: CancelHandle::default(),
        }
    }

    /// Share sensor locks with the ingestion consumer writing to the same
    /// store.
    pub fn with_sensor_locks(mut self, locks: SensorLocks) -> Self {
        self.locks = locks;
        self
    }

    /// The sensor locks this controller takes around each page.
    pub fn sensor_locks(&self) -> SensorLocks {
        self.locks.clone()
    }

    /// Sensors this controller syncs, in order.
    pub fn sensors(&self) -> &[SensorId] {
        &self.sensors
    }

    /// Handle for cancelling the running sync.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Check if a run is in flight.
    pub fn is_running(&self) -> bool {
        self.run_guard.try_lock().is_err()
    }

    /// Run one sync pass.
    ///
    /// Never fails: every error ends the run with the matching outcome.
    pub async fn run(&self) -> SyncOutcome {
        let Ok(_guard) = self.run_guard.try_lock() else {
            tracing::info!("Sync requested while another run is in flight");
            return SyncOutcome::AlreadyRunning;
        };
        self.cancel.reset();

        let mut cursor = match self.cursor_store.get().await {
            Ok(stored) => SyncCursor::new(stored),
            Err(e) => {
                // Delivered rows are already gone, so paging from the epoch
                // only costs a longer scan.
                tracing::warn!("Failed to read sync cursor, syncing from epoch: {}", e);
                SyncCursor::default()
            }
        };
        let since = cursor.since();
        tracing::info!(
            since = since.as_millis(),
            sensors = self.sensors.len(),
            "Sync run started"
        );

        let (mut run, actions) = SyncRun::start(since, self.sensors.len());
        let mut queue: VecDeque<Action> = actions.into();
        let mut pending: Option<PendingPage> = None;
        let mut _page_lock: Option<OwnedMutexGuard<()>> = None;

        while let Some(action) = queue.pop_front() {
            let event = match action {
                Action::CheckPeer => Event::PeerChecked {
                    reachable: self.transport.is_peer_reachable().await,
                },
                Action::FetchPage { sensor } => {
                    _page_lock = None;
                    if self.cancel.is_cancelled() {
                        Event::CancelRequested
                    } else {
                        let sensor_id = &self.sensors[sensor];
                        let lock = self.locks.lock(sensor_id).await;
                        let event = self.fetch_page(sensor_id, since, &mut pending).await;
                        if matches!(&event, Event::PageReady { rows, .. } if *rows > 0) {
                            _page_lock = Some(lock);
                        }
                        event
                    }
                }
                Action::SendChunk { sensor } => {
                    self.send_page(&self.sensors[sensor], since, pending.take())
                        .await
                }
                Action::DeleteUpTo { sensor, end } => {
                    let event = self.delete_range(&self.sensors[sensor], end).await;
                    _page_lock = None;
                    event
                }
                Action::AdvanceCursor => {
                    let value = cursor.advance(Timestamp::now());
                    match self.cursor_store.set(value).await {
                        Ok(()) => Event::CursorWritten { cursor: value },
                        Err(e) => Event::CursorWriteFailed {
                            reason: e.to_string(),
                        },
                    }
                }
                Action::Finish(outcome) => {
                    log_outcome(&outcome);
                    return outcome;
                }
            };

            let (next, actions) = run.on_event(event);
            run = next;
            queue.extend(actions);
        }

        // The machine always ends with Finish; this only guards a stall.
        let outcome = run.outcome().cloned().unwrap_or(SyncOutcome::NothingToSync);
        log_outcome(&outcome);
        outcome
    }

    /// Read the next page of a sensor and prepare it for sending.
    ///
    /// The page is read with one row of lookahead and cut so that no
    /// timestamp group is split across delete ranges. A group with more rows
    /// than `page_limit` is only counted here and streamed at send time.
    async fn fetch_page(
        &self,
        sensor_id: &SensorId,
        since: Timestamp,
        pending: &mut Option<PendingPage>,
    ) -> Event {
        let limit = self.page_limit;
        let mut page = match self.store.read_since(sensor_id, since, limit + 1).await {
            Ok(page) => page,
            Err(e) => {
                return Event::FetchFailed {
                    reason: e.to_string(),
                }
            }
        };
        if page.is_empty() {
            tracing::debug!(sensor = %sensor_id, "Sensor drained");
            return Event::PageReady {
                rows: 0,
                end: since,
                chunks: 0,
            };
        }

        let len = complete_page_len(&page, limit);
        if len < page.len() && page[len - 1].timestamp == page[len].timestamp {
            let at = page[0].timestamp;
            return self.prepare_group(sensor_id, at, pending).await;
        }
        page.truncate(len);

        match BatchEncoder::encode(sensor_id, since, page) {
            Ok((chunk, bytes)) => {
                tracing::debug!(
                    sensor = %sensor_id,
                    batch = %chunk.batch_id,
                    rows = chunk.record_count,
                    end = chunk.end.as_millis(),
                    "Chunk encoded"
                );
                *pending = Some(PendingPage::Chunk(bytes));
                Event::PageReady {
                    rows: chunk.record_count,
                    end: chunk.end,
                    chunks: 1,
                }
            }
            Err(e) => Event::FetchFailed {
                reason: e.to_string(),
            },
        }
    }

    async fn prepare_group(
        &self,
        sensor_id: &SensorId,
        at: Timestamp,
        pending: &mut Option<PendingPage>,
    ) -> Event {
        let rows = match self.store.count_at(sensor_id, at).await {
            Ok(rows) => rows,
            Err(e) => {
                return Event::FetchFailed {
                    reason: e.to_string(),
                }
            }
        };
        let chunks = rows.div_ceil(self.page_limit as u64);
        tracing::warn!(
            sensor = %sensor_id,
            timestamp = at.as_millis(),
            rows,
            chunks,
            "Timestamp group exceeds page limit, deleting it after all its chunks"
        );
        *pending = Some(PendingPage::Group(at));
        Event::PageReady {
            rows: usize::try_from(rows).unwrap_or(usize::MAX),
            end: at,
            chunks: u32::try_from(chunks).unwrap_or(u32::MAX),
        }
    }

    async fn send_page(
        &self,
        sensor_id: &SensorId,
        since: Timestamp,
        page: Option<PendingPage>,
    ) -> Event {
        match page {
            Some(PendingPage::Chunk(payload)) => self.send_payload(sensor_id, &payload).await,
            Some(PendingPage::Group(at)) => self.send_group(sensor_id, since, at).await,
            None => Event::SendFailed {
                reason: "no encoded chunk to send".to_string(),
            },
        }
    }

    /// Send a timestamp group in chunks of at most `page_limit` rows, reading
    /// one chunk's worth at a time.
    async fn send_group(&self, sensor_id: &SensorId, since: Timestamp, at: Timestamp) -> Event {
        let mut offset = 0;
        loop {
            let part = match self
                .store
                .read_at(sensor_id, at, offset, self.page_limit)
                .await
            {
                Ok(part) => part,
                Err(e) => {
                    return Event::FetchFailed {
                        reason: e.to_string(),
                    }
                }
            };
            if part.is_empty() {
                break;
            }
            let last = part.len() < self.page_limit;
            offset += part.len();

            let payload = match encode_part(sensor_id, since, part) {
                Ok(payload) => payload,
                Err(reason) => return Event::FetchFailed { reason },
            };
            let event = self.send_payload(sensor_id, &payload).await;
            if !matches!(event, Event::SendSucceeded) || last {
                return event;
            }
        }
        Event::SendSucceeded
    }

    async fn send_payload(&self, sensor_id: &SensorId, payload: &[u8]) -> Event {
        match self.transport.send(&self.transport_key, payload).await {
            Ok(()) => Event::SendSucceeded,
            Err(e) => {
                tracing::warn!(sensor = %sensor_id, "Chunk send failed: {}", e);
                Event::SendFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn delete_range(&self, sensor_id: &SensorId, end: Timestamp) -> Event {
        match self.store.delete_up_to(sensor_id, end).await {
            Ok(removed) => {
                tracing::debug!(sensor = %sensor_id, removed, "Delivered rows deleted");
                Event::Deleted
            }
            Err(e) => {
                tracing::error!(
                    sensor = %sensor_id,
                    "Failed to delete delivered rows, they will be sent again: {}",
                    e
                );
                Event::DeleteFailed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

fn encode_part(
    sensor_id: &SensorId,
    since: Timestamp,
    part: Vec<SensorEvent>,
) -> Result<Vec<u8>, String> {
    let (chunk, payload) =
        BatchEncoder::encode(sensor_id, since, part).map_err(|e| e.to_string())?;
    tracing::debug!(
        sensor = %sensor_id,
        batch = %chunk.batch_id,
        rows = chunk.record_count,
        "Group chunk encoded"
    );
    Ok(payload)
}

fn log_outcome(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Success { chunks, rows, .. } => {
            tracing::info!(chunks, rows, "Sync complete");
        }
        SyncOutcome::PartialFailure {
            chunks,
            rows,
            failure,
        } => {
            tracing::warn!(chunks, rows, "Sync stopped early: {}", failure);
        }
        other => tracing::info!("Sync finished: {}", other.message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::ingest::{spawn_ingestion, IngestHandle};
    use crate::store::{MemoryCursorStore, MemoryStore, StoreOp};
    use crate::transport::{MockTransport, TransportError};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;
    use wearsync_types::ReceivedChunk;

    fn sync_config(page_limit: usize) -> SyncConfig {
        SyncConfig {
            page_limit,
            ..SyncConfig::default()
        }
    }

    fn controller<T: Transport>(
        transport: Arc<T>,
        store: &MemoryStore,
        cursor: &MemoryCursorStore,
        sensors: &[&str],
        page_limit: usize,
    ) -> SyncController<T, MemoryStore, MemoryCursorStore> {
        SyncController::new(
            transport,
            Arc::new(store.clone()),
            Arc::new(cursor.clone()),
            sensors.iter().map(|s| SensorId::from(*s)).collect(),
            &sync_config(page_limit),
        )
    }

    async fn seed(store: &MemoryStore, sensor: &str, timestamps: impl IntoIterator<Item = i64>) {
        let rows: Vec<SensorEvent> = timestamps
            .into_iter()
            .map(|ts| SensorEvent::new(sensor, Timestamp::from_millis(ts)).with_field("v", ts))
            .collect();
        store.append(&SensorId::from(sensor), &rows).await.unwrap();
    }

    fn record_counts(transport: &MockTransport) -> Vec<usize> {
        transport
            .sent_messages()
            .iter()
            .map(|m| ReceivedChunk::from_bytes(&m.payload).unwrap().record_count())
            .collect()
    }

    fn deletes(store: &MemoryStore) -> Vec<(SensorId, i64)> {
        store
            .ops()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::Delete { sensor_id, up_to, .. } => Some((sensor_id, up_to.as_millis())),
                _ => None,
            })
            .collect()
    }

    /// Fails the test if any row of a chunk is gone before the chunk is sent.
    struct CheckingTransport {
        inner: MockTransport,
        store: MemoryStore,
    }

    #[async_trait]
    impl Transport for CheckingTransport {
        async fn is_peer_reachable(&self) -> bool {
            self.inner.is_peer_reachable().await
        }

        async fn send(&self, key: &str, payload: &[u8]) -> Result<(), TransportError> {
            let chunk = ReceivedChunk::from_bytes(payload).unwrap();
            let stored = self.store.timestamps(&chunk.sensor_id);
            let ts_col = chunk.column("timestamp").unwrap();
            for row in &chunk.rows {
                let ts: i64 = row[ts_col].parse().unwrap();
                assert!(stored.contains(&ts), "row {} deleted before send", ts);
            }
            self.inner.send(key, payload).await
        }
    }

    /// Requests cancellation while its first chunk is in flight.
    struct CancellingTransport {
        inner: MockTransport,
        cancel: std::sync::Mutex<Option<CancelHandle>>,
    }

    #[async_trait]
    impl Transport for CancellingTransport {
        async fn is_peer_reachable(&self) -> bool {
            true
        }

        async fn send(&self, key: &str, payload: &[u8]) -> Result<(), TransportError> {
            if let Some(cancel) = self.cancel.lock().unwrap().as_ref() {
                cancel.cancel();
            }
            self.inner.send(key, payload).await
        }
    }

    /// Submits one more sample through ingestion while its first chunk is in
    /// flight, and gives the consumer time to flush it.
    struct LateSampleTransport {
        inner: MockTransport,
        ingest: IngestHandle,
        late: std::sync::Mutex<Option<SensorEvent>>,
    }

    #[async_trait]
    impl Transport for LateSampleTransport {
        async fn is_peer_reachable(&self) -> bool {
            true
        }

        async fn send(&self, key: &str, payload: &[u8]) -> Result<(), TransportError> {
            let late = self.late.lock().unwrap().take();
            if let Some(event) = late {
                self.ingest.submit(event).unwrap();
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.send(key, payload).await
        }
    }

    /// Holds every send until released.
    #[derive(Default)]
    struct GateTransport {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Transport for GateTransport {
        async fn is_peer_reachable(&self) -> bool {
            true
        }

        async fn send(&self, _key: &str, _payload: &[u8]) -> Result<(), TransportError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn backlog_goes_out_in_bounded_chunks() {
        let transport = MockTransport::new();
        let store = MemoryStore::new();
        let cursor = MemoryCursorStore::new();
        seed(&store, "temp", 1..=250).await;
        let sync = controller(Arc::new(transport.clone()), &store, &cursor, &["temp"], 100);

        let before = Timestamp::now();
        let outcome = sync.run().await;

        match outcome {
            SyncOutcome::Success {
                chunks,
                rows,
                cursor: written,
            } => {
                assert_eq!(chunks, 3);
                assert_eq!(rows, 250);
                assert!(written >= before);
                assert_eq!(cursor.get().await.unwrap(), Some(written));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(record_counts(&transport), vec![100, 100, 50]);
        let temp = SensorId::from("temp");
        assert_eq!(
            deletes(&store),
            vec![(temp.clone(), 100), (temp.clone(), 200), (temp, 250)]
        );
        assert_eq!(cursor.writes(), 1);
    }

    #[tokio::test]
    async fn every_chunk_uses_the_configured_key() {
        let transport = MockTransport::new();
        let store = MemoryStore::new();
        seed(&store, "temp", 1..=3).await;
        let sync = controller(
            Arc::new(transport.clone()),
            &store,
            &MemoryCursorStore::new(),
            &["temp"],
            2,
        );

        sync.run().await;

        let sent = transport.sent_messages();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| m.key == "sensor_data"));
    }

    #[tokio::test]
    async fn unreachable_peer_touches_nothing() {
        let transport = MockTransport::unreachable();
        let store = MemoryStore::new();
        let cursor = MemoryCursorStore::with_cursor(Timestamp::from_millis(5));
        seed(&store, "temp", 10..20).await;
        let sync = controller(Arc::new(transport.clone()), &store, &cursor, &["temp"], 100);

        let outcome = sync.run().await;

        assert_eq!(outcome, SyncOutcome::PeerUnavailable);
        assert_eq!(outcome.message(), "not connected");
        assert_eq!(transport.send_attempts(), 0);
        assert!(deletes(&store).is_empty());
        assert_eq!(store.count(&SensorId::from("temp")).await.unwrap(), 10);
        assert_eq!(cursor.get().await.unwrap(), Some(Timestamp::from_millis(5)));
    }

    #[tokio::test]
    async fn send_failure_stops_later_sensors_and_keeps_cursor() {
        let transport = MockTransport::new();
        let store = MemoryStore::new();
        let cursor = MemoryCursorStore::new();
        seed(&store, "temp", 1..=100).await;
        seed(&store, "hr", 1..=100).await;
        transport.fail_send_attempt(2, "link lost");
        let sync = controller(Arc::new(transport.clone()), &store, &cursor, &["temp", "hr"], 100);

        let outcome = sync.run().await;

        assert!(matches!(
            outcome,
            SyncOutcome::PartialFailure {
                chunks: 1,
                rows: 100,
                failure: wearsync_core::RunFailure::Send { sensor: 1, .. },
            }
        ));
        assert_eq!(outcome.message(), "send failed");
        assert_eq!(store.count(&SensorId::from("temp")).await.unwrap(), 0);
        assert_eq!(store.count(&SensorId::from("hr")).await.unwrap(), 100);
        assert_eq!(cursor.get().await.unwrap(), None);

        // The rerun only has hr left.
        let outcome = sync.run().await;
        assert!(outcome.is_success());
        assert_eq!(transport.sent_messages().len(), 2);
        let last = ReceivedChunk::from_bytes(&transport.last_sent().unwrap().payload).unwrap();
        assert_eq!(last.sensor_id, SensorId::from("hr"));
        assert_eq!(store.count(&SensorId::from("hr")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failure_skips_remaining_pages_of_same_sensor() {
        let transport = MockTransport::new();
        let store = MemoryStore::new();
        seed(&store, "temp", 1..=30).await;
        transport.fail_send_attempt(2, "timeout");
        let sync = controller(
            Arc::new(transport.clone()),
            &store,
            &MemoryCursorStore::new(),
            &["temp"],
            10,
        );

        sync.run().await;

        assert_eq!(transport.send_attempts(), 2);
        assert_eq!(store.timestamps(&SensorId::from("temp")), (11..=30).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn rows_are_never_deleted_before_their_send() {
        let store = MemoryStore::new();
        seed(&store, "temp", 1..=45).await;
        seed(&store, "hr", 1..=12).await;
        let inner = MockTransport::new();
        inner.fail_send_attempt(5, "dropped");
        let transport = Arc::new(CheckingTransport {
            inner: inner.clone(),
            store: store.clone(),
        });
        let sync = controller(transport, &store, &MemoryCursorStore::new(), &["temp", "hr"], 10);

        let outcome = sync.run().await;

        assert!(matches!(outcome, SyncOutcome::PartialFailure { chunks: 4, .. }));
        // Only the four acknowledged ranges were deleted.
        assert_eq!(deletes(&store).len(), 4);
        assert_eq!(store.timestamps(&SensorId::from("temp")), (41..=45).collect::<Vec<_>>());
        assert_eq!(store.count(&SensorId::from("hr")).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn rerun_after_success_is_a_no_op() {
        let transport = MockTransport::new();
        let store = MemoryStore::new();
        let cursor = MemoryCursorStore::new();
        seed(&store, "temp", 1..=5).await;
        let sync = controller(Arc::new(transport.clone()), &store, &cursor, &["temp"], 100);

        assert!(sync.run().await.is_success());
        let outcome = sync.run().await;

        assert_eq!(outcome, SyncOutcome::NothingToSync);
        assert_eq!(outcome.message(), "nothing to sync");
        assert_eq!(transport.sent_messages().len(), 1);
        assert_eq!(cursor.writes(), 1);
    }

    #[tokio::test]
    async fn empty_store_has_nothing_to_sync() {
        let transport = MockTransport::new();
        let cursor = MemoryCursorStore::new();
        let sync = controller(
            Arc::new(transport.clone()),
            &MemoryStore::new(),
            &cursor,
            &["temp", "hr"],
            100,
        );

        assert_eq!(sync.run().await, SyncOutcome::NothingToSync);
        assert_eq!(transport.send_attempts(), 0);
        assert_eq!(cursor.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn rows_at_or_before_cursor_are_not_sent() {
        let transport = MockTransport::new();
        let store = MemoryStore::new();
        let cursor = MemoryCursorStore::with_cursor(Timestamp::from_millis(10));
        seed(&store, "temp", 5..=15).await;
        let sync = controller(Arc::new(transport.clone()), &store, &cursor, &["temp"], 100);

        sync.run().await;

        let chunk = ReceivedChunk::from_bytes(&transport.last_sent().unwrap().payload).unwrap();
        assert_eq!(chunk.since, Timestamp::from_millis(10));
        assert_eq!(chunk.record_count(), 5);
    }

    #[tokio::test]
    async fn chunks_never_split_a_timestamp_group() {
        let transport = MockTransport::new();
        let store = MemoryStore::new();
        seed(&store, "accel", [1, 2, 3, 3, 3, 4]).await;
        let sync = controller(
            Arc::new(transport.clone()),
            &store,
            &MemoryCursorStore::new(),
            &["accel"],
            4,
        );

        assert!(sync.run().await.is_success());

        assert_eq!(record_counts(&transport), vec![2, 4]);
        assert_eq!(store.count(&SensorId::from("accel")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn oversized_timestamp_group_is_deleted_after_all_its_chunks() {
        let transport = MockTransport::new();
        let store = MemoryStore::new();
        seed(&store, "accel", [7, 7, 7, 7, 7, 8]).await;
        let sync = controller(
            Arc::new(transport.clone()),
            &store,
            &MemoryCursorStore::new(),
            &["accel"],
            3,
        );

        let outcome = sync.run().await;

        assert!(matches!(
            outcome,
            SyncOutcome::Success {
                chunks: 3,
                rows: 6,
                ..
            }
        ));
        assert_eq!(record_counts(&transport), vec![3, 2, 1]);
        let accel = SensorId::from("accel");
        assert_eq!(deletes(&store), vec![(accel.clone(), 7), (accel, 8)]);
    }

    #[tokio::test]
    async fn oversized_group_is_read_in_bounded_slices() {
        let transport = MockTransport::new();
        let store = MemoryStore::new();
        seed(&store, "accel", [7, 7, 7, 7].into_iter().chain(8..58)).await;
        let sync = controller(
            Arc::new(transport.clone()),
            &store,
            &MemoryCursorStore::new(),
            &["accel"],
            3,
        );

        assert!(sync.run().await.is_success());

        let largest_read = store
            .ops()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::Read { returned, .. } | StoreOp::ReadAt { returned, .. } => {
                    Some(returned)
                }
                _ => None,
            })
            .max();
        assert_eq!(largest_read, Some(4));
        assert!(record_counts(&transport).iter().all(|&n| n <= 3));
        assert_eq!(record_counts(&transport).iter().sum::<usize>(), 54);
        assert_eq!(store.count(&SensorId::from("accel")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sample_flushed_during_send_is_not_deleted_unsent() {
        let store = MemoryStore::new();
        let temp = SensorId::from("temp");
        seed(&store, "temp", 1..=5).await;
        let locks = SensorLocks::new();
        let ingest_config = IngestConfig {
            batch_size: 1,
            ..IngestConfig::default()
        };
        let (ingest, task) =
            spawn_ingestion(Arc::new(store.clone()), &ingest_config, locks.clone());
        let transport = Arc::new(LateSampleTransport {
            inner: MockTransport::new(),
            ingest,
            late: std::sync::Mutex::new(Some(
                SensorEvent::new("temp", Timestamp::from_millis(5)).with_field("v", 99),
            )),
        });
        let sync = controller(
            Arc::clone(&transport),
            &store,
            &MemoryCursorStore::new(),
            &["temp"],
            100,
        )
        .with_sensor_locks(locks);

        let outcome = sync.run().await;

        // The late row is appended after the first delete and goes out in a
        // second chunk of the same run.
        assert!(matches!(
            outcome,
            SyncOutcome::Success {
                chunks: 2,
                rows: 6,
                ..
            }
        ));
        assert_eq!(record_counts(&transport.inner), vec![5, 1]);
        let last = transport.inner.last_sent().unwrap();
        let chunk = ReceivedChunk::from_bytes(&last.payload).unwrap();
        assert_eq!(chunk.rows[0][1], "99");
        assert!(store.timestamps(&temp).is_empty());

        let report = task.shutdown().await.unwrap();
        assert_eq!(report.persisted, 1);
    }

    #[tokio::test]
    async fn failure_inside_oversized_group_deletes_nothing() {
        let transport = MockTransport::new();
        let store = MemoryStore::new();
        seed(&store, "accel", [7, 7, 7, 7, 7]).await;
        transport.fail_send_attempt(2, "link lost");
        let sync = controller(
            Arc::new(transport.clone()),
            &store,
            &MemoryCursorStore::new(),
            &["accel"],
            3,
        );

        let outcome = sync.run().await;

        assert_eq!(outcome.message(), "send failed");
        assert!(deletes(&store).is_empty());
        assert_eq!(store.count(&SensorId::from("accel")).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn cursor_does_not_move_backward() {
        // A stored cursor ahead of the wall clock (the clock was stepped back).
        let future = Timestamp::from_millis(Timestamp::now().as_millis() + 3_600_000);
        let store = MemoryStore::new();
        let cursor = MemoryCursorStore::with_cursor(future);
        seed(&store, "temp", [future.as_millis() + 1]).await;
        let sync = controller(Arc::new(MockTransport::new()), &store, &cursor, &["temp"], 100);

        let outcome = sync.run().await;

        assert!(matches!(outcome, SyncOutcome::Success { cursor: c, .. } if c == future));
        assert_eq!(cursor.get().await.unwrap(), Some(future));
    }

    #[tokio::test]
    async fn fetch_failure_is_a_storage_error() {
        let store = MemoryStore::new();
        seed(&store, "temp", 1..=5).await;
        store.fail_next_read("io error");
        let sync = controller(
            Arc::new(MockTransport::new()),
            &store,
            &MemoryCursorStore::new(),
            &["temp"],
            100,
        );

        let outcome = sync.run().await;

        assert_eq!(outcome.message(), "storage error");
        assert_eq!(store.count(&SensorId::from("temp")).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn delete_failure_after_send_is_reported() {
        let transport = MockTransport::new();
        let store = MemoryStore::new();
        let cursor = MemoryCursorStore::new();
        seed(&store, "temp", 1..=5).await;
        store.fail_next_delete("locked");
        let sync = controller(Arc::new(transport.clone()), &store, &cursor, &["temp"], 100);

        let outcome = sync.run().await;

        assert!(matches!(
            outcome,
            SyncOutcome::PartialFailure {
                chunks: 1,
                failure: wearsync_core::RunFailure::Store { .. },
                ..
            }
        ));
        // Delivered but still stored: the next run sends it again.
        assert_eq!(store.count(&SensorId::from("temp")).await.unwrap(), 5);
        assert_eq!(cursor.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn cursor_write_failure_is_reported() {
        let store = MemoryStore::new();
        let cursor = MemoryCursorStore::new();
        seed(&store, "temp", 1..=5).await;
        cursor.fail_next_set("read-only");
        let sync = controller(Arc::new(MockTransport::new()), &store, &cursor, &["temp"], 100);

        let outcome = sync.run().await;

        assert_eq!(outcome.message(), "sync state not saved");
        assert_eq!(store.count(&SensorId::from("temp")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cancel_stops_between_chunks() {
        let inner = MockTransport::new();
        let store = MemoryStore::new();
        let cursor = MemoryCursorStore::new();
        seed(&store, "temp", 1..=30).await;
        let transport = Arc::new(CancellingTransport {
            inner: inner.clone(),
            cancel: std::sync::Mutex::new(None),
        });
        let sync = controller(transport.clone(), &store, &cursor, &["temp"], 10);
        *transport.cancel.lock().unwrap() = Some(sync.cancel_handle());

        let outcome = sync.run().await;

        assert_eq!(outcome, SyncOutcome::Cancelled { chunks: 1, rows: 10 });
        assert_eq!(inner.sent_messages().len(), 1);
        // The in-flight chunk completed, including its delete.
        assert_eq!(store.count(&SensorId::from("temp")).await.unwrap(), 20);
        assert_eq!(cursor.writes(), 0);
    }

    #[tokio::test]
    async fn cancel_before_run_is_cleared() {
        let store = MemoryStore::new();
        seed(&store, "temp", 1..=3).await;
        let sync = controller(
            Arc::new(MockTransport::new()),
            &store,
            &MemoryCursorStore::new(),
            &["temp"],
            100,
        );

        sync.cancel_handle().cancel();
        assert!(sync.run().await.is_success());
    }

    #[tokio::test]
    async fn concurrent_run_is_rejected() {
        let store = MemoryStore::new();
        seed(&store, "temp", 1..=3).await;
        let gate = Arc::new(GateTransport::default());
        let sync = Arc::new(controller(
            gate.clone(),
            &store,
            &MemoryCursorStore::new(),
            &["temp"],
            100,
        ));

        let first = tokio::spawn({
            let sync = Arc::clone(&sync);
            async move { sync.run().await }
        });
        gate.entered.notified().await;

        assert!(sync.is_running());
        assert_eq!(sync.run().await, SyncOutcome::AlreadyRunning);

        gate.release.notify_one();
        assert!(first.await.unwrap().is_success());
        assert!(!sync.is_running());
    }
}
