//! Sync run state machine for wearsync.
//!
//! This module provides a pure, side-effect-free state machine for one sync
//! run. The state machine takes events as input and produces a new state
//! plus a list of actions to execute.
//!
//! ```text
//! Idle → CheckPeer → Fetch(s) ⇄ Send(s) → Delete(s) → … → Finalize
//! ```
//!
//! The actual I/O (reading and deleting store rows, sending chunks, writing
//! the cursor) is performed by sync-client, not by this module. The machine
//! enforces the ordering contract: a delete is only ever requested after
//! the send of that same chunk succeeded, and a failure ends the run for
//! the current and every later sensor.

use std::fmt;
use wearsync_types::Timestamp;

/// Why a run stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunFailure {
    /// The transport rejected or timed out on a chunk.
    Send {
        /// Index of the sensor whose chunk failed.
        sensor: usize,
        /// Transport error message.
        reason: String,
    },
    /// Reading a page or deleting a delivered range failed.
    Store {
        /// Index of the sensor being processed.
        sensor: usize,
        /// Storage error message.
        reason: String,
    },
    /// Everything was delivered but the cursor could not be saved.
    Cursor {
        /// Storage error message.
        reason: String,
    },
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunFailure::Send { reason, .. } => write!(f, "send failed: {}", reason),
            RunFailure::Store { reason, .. } => write!(f, "storage error: {}", reason),
            RunFailure::Cursor { reason } => write!(f, "cursor not saved: {}", reason),
        }
    }
}

/// Terminal result of a sync run, the only thing surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every pending page was delivered and the cursor advanced.
    Success {
        /// Chunks delivered and deleted.
        chunks: u32,
        /// Rows in those chunks.
        rows: u64,
        /// New cursor value.
        cursor: Timestamp,
    },
    /// Nothing newer than the cursor was stored.
    NothingToSync,
    /// A failure stopped the run; chunks delivered before it stay deleted.
    PartialFailure {
        /// Chunks delivered before the failure.
        chunks: u32,
        /// Rows in those chunks.
        rows: u64,
        /// What failed.
        failure: RunFailure,
    },
    /// No reachable companion at run start; nothing was touched.
    PeerUnavailable,
    /// Cancelled between chunks; the cursor was left untouched.
    Cancelled {
        /// Chunks delivered before cancellation.
        chunks: u32,
        /// Rows in those chunks.
        rows: u64,
    },
    /// Another run was in flight; this request was rejected.
    AlreadyRunning,
}

impl SyncOutcome {
    /// Check if the run delivered everything and advanced the cursor.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short user-facing description.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Success { .. } => "sync complete",
            Self::NothingToSync => "nothing to sync",
            Self::PartialFailure {
                failure: RunFailure::Send { .. },
                ..
            } => "send failed",
            Self::PartialFailure {
                failure: RunFailure::Store { .. },
                ..
            } => "storage error",
            Self::PartialFailure {
                failure: RunFailure::Cursor { .. },
                ..
            } => "sync state not saved",
            Self::PeerUnavailable => "not connected",
            Self::Cancelled { .. } => "sync cancelled",
            Self::AlreadyRunning => "sync already running",
        }
    }
}

/// Bookkeeping accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunProgress {
    /// Chunks whose send succeeded.
    pub chunks: u32,
    /// Rows in those chunks.
    pub rows: u64,
    /// Newest row timestamp delivered so far.
    pub max_timestamp_seen: Timestamp,
    /// Set when the first failure is recorded.
    pub failure: Option<RunFailure>,
}

impl RunProgress {
    /// At least one chunk was delivered.
    pub fn data_sent(&self) -> bool {
        self.chunks > 0
    }

    /// A failure was recorded for this run.
    pub fn error_occurred(&self) -> bool {
        self.failure.is_some()
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    /// No run started.
    Idle,
    /// Waiting for the peer reachability check.
    CheckPeer,
    /// Waiting for the next page of a sensor.
    Fetch {
        /// Sensor index.
        sensor: usize,
    },
    /// A page is being sent.
    Send {
        /// Sensor index.
        sensor: usize,
        /// Delete bound once the send succeeds.
        end: Timestamp,
        /// Rows in the page.
        rows: usize,
        /// Chunks the page goes out as.
        chunks: u32,
    },
    /// A delivered range is being deleted.
    Delete {
        /// Sensor index.
        sensor: usize,
        /// Delete bound.
        end: Timestamp,
        /// Rows in the page.
        rows: usize,
    },
    /// All delivered, the cursor is being written.
    AdvanceCursor,
    /// The run is over.
    Finished(SyncOutcome),
}

/// Events fed to the state machine by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Result of the reachability check.
    PeerChecked {
        /// Whether the companion can be reached.
        reachable: bool,
    },
    /// A page was read and encoded. `rows == 0` means the sensor is drained.
    ///
    /// A page is one chunk, except a timestamp group larger than the page
    /// limit, which goes out as several chunks under a single delete.
    PageReady {
        /// Rows in the page.
        rows: usize,
        /// Highest timestamp in the page.
        end: Timestamp,
        /// Chunks the page is sent as.
        chunks: u32,
    },
    /// Reading or encoding a page failed, while fetching it or while
    /// streaming a timestamp group out.
    FetchFailed {
        /// Error message.
        reason: String,
    },
    /// The transport accepted every chunk of the page.
    SendSucceeded,
    /// The transport rejected a chunk.
    SendFailed {
        /// Error message.
        reason: String,
    },
    /// The delivered range was deleted.
    Deleted,
    /// Deleting the delivered range failed.
    DeleteFailed {
        /// Error message.
        reason: String,
    },
    /// Cancellation was requested; honored only between chunks.
    CancelRequested,
    /// The cursor was persisted.
    CursorWritten {
        /// Value written.
        cursor: Timestamp,
    },
    /// Persisting the cursor failed.
    CursorWriteFailed {
        /// Error message.
        reason: String,
    },
}

/// Actions to be executed by the sync-client.
///
/// These are instructions, not side effects. The sync-client interprets
/// these and performs the actual I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Query transport reachability.
    CheckPeer,
    /// Read, trim and encode the next page of a sensor.
    FetchPage {
        /// Sensor index.
        sensor: usize,
    },
    /// Send the page built by the last fetch.
    SendChunk {
        /// Sensor index.
        sensor: usize,
    },
    /// Delete rows of a sensor with timestamp at or below `end`.
    DeleteUpTo {
        /// Sensor index.
        sensor: usize,
        /// Inclusive delete bound.
        end: Timestamp,
    },
    /// Persist a new cursor value.
    AdvanceCursor,
    /// The run is over with this outcome.
    Finish(SyncOutcome),
}

/// State of one sync run - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRun {
    phase: RunPhase,
    since: Timestamp,
    sensor_count: usize,
    progress: RunProgress,
}

impl SyncRun {
    /// Create an idle run.
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Idle,
            since: Timestamp::EPOCH,
            sensor_count: 0,
            progress: RunProgress::default(),
        }
    }

    /// Start a run over `sensor_count` sensors, paging from `since`.
    ///
    /// `since` is fixed for the whole run.
    pub fn start(since: Timestamp, sensor_count: usize) -> (Self, Vec<Action>) {
        let run = Self {
            phase: RunPhase::CheckPeer,
            since,
            sensor_count,
            progress: RunProgress::default(),
        };
        (run, vec![Action::CheckPeer])
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (sync-client)
    /// is responsible for executing the returned actions.
    pub fn on_event(mut self, event: Event) -> (Self, Vec<Action>) {
        match (self.phase.clone(), event) {
            // From CheckPeer
            (RunPhase::CheckPeer, Event::PeerChecked { reachable: false }) => {
                self.finish(SyncOutcome::PeerUnavailable)
            }
            (RunPhase::CheckPeer, Event::PeerChecked { reachable: true }) => self.fetch(0),

            // From Fetch
            (RunPhase::Fetch { .. }, Event::CancelRequested) => {
                let outcome = SyncOutcome::Cancelled {
                    chunks: self.progress.chunks,
                    rows: self.progress.rows,
                };
                self.finish(outcome)
            }
            (RunPhase::Fetch { sensor }, Event::PageReady { rows: 0, .. }) => {
                self.fetch(sensor + 1)
            }
            (RunPhase::Fetch { sensor }, Event::PageReady { rows, end, chunks }) => {
                self.phase = RunPhase::Send {
                    sensor,
                    end,
                    rows,
                    chunks: chunks.max(1),
                };
                (self, vec![Action::SendChunk { sensor }])
            }
            (RunPhase::Fetch { sensor }, Event::FetchFailed { reason }) => {
                self.fail(RunFailure::Store { sensor, reason })
            }

            // From Send
            (
                RunPhase::Send {
                    sensor,
                    end,
                    rows,
                    chunks,
                },
                Event::SendSucceeded,
            ) => {
                self.progress.chunks += chunks;
                self.progress.rows += rows as u64;
                self.progress.max_timestamp_seen = self.progress.max_timestamp_seen.max(end);
                self.phase = RunPhase::Delete { sensor, end, rows };
                (self, vec![Action::DeleteUpTo { sensor, end }])
            }
            (RunPhase::Send { sensor, .. }, Event::SendFailed { reason }) => {
                self.fail(RunFailure::Send { sensor, reason })
            }
            (RunPhase::Send { sensor, .. }, Event::FetchFailed { reason }) => {
                self.fail(RunFailure::Store { sensor, reason })
            }

            // From Delete
            (RunPhase::Delete { sensor, .. }, Event::Deleted) => {
                // More pages may remain for the same sensor.
                self.phase = RunPhase::Fetch { sensor };
                (self, vec![Action::FetchPage { sensor }])
            }
            (RunPhase::Delete { sensor, .. }, Event::DeleteFailed { reason }) => {
                self.fail(RunFailure::Store { sensor, reason })
            }

            // From AdvanceCursor
            (RunPhase::AdvanceCursor, Event::CursorWritten { cursor }) => {
                let outcome = SyncOutcome::Success {
                    chunks: self.progress.chunks,
                    rows: self.progress.rows,
                    cursor,
                };
                self.finish(outcome)
            }
            (RunPhase::AdvanceCursor, Event::CursorWriteFailed { reason }) => {
                self.fail(RunFailure::Cursor { reason })
            }

            // Invalid transitions - stay in current state
            (_, _) => (self, vec![]),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> &RunPhase {
        &self.phase
    }

    /// The run's fixed since bound.
    pub fn since(&self) -> Timestamp {
        self.since
    }

    /// Bookkeeping so far.
    pub fn progress(&self) -> &RunProgress {
        &self.progress
    }

    /// The outcome, once finished.
    pub fn outcome(&self) -> Option<&SyncOutcome> {
        match &self.phase {
            RunPhase::Finished(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Check if the run is over.
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, RunPhase::Finished(_))
    }

    fn fetch(mut self, sensor: usize) -> (Self, Vec<Action>) {
        if sensor >= self.sensor_count {
            return self.finalize();
        }
        self.phase = RunPhase::Fetch { sensor };
        (self, vec![Action::FetchPage { sensor }])
    }

    fn fail(mut self, failure: RunFailure) -> (Self, Vec<Action>) {
        self.progress.failure = Some(failure);
        self.finalize()
    }

    fn finalize(mut self) -> (Self, Vec<Action>) {
        if let Some(failure) = self.progress.failure.clone() {
            let outcome = SyncOutcome::PartialFailure {
                chunks: self.progress.chunks,
                rows: self.progress.rows,
                failure,
            };
            return self.finish(outcome);
        }
        if self.progress.data_sent() {
            self.phase = RunPhase::AdvanceCursor;
            return (self, vec![Action::AdvanceCursor]);
        }
        self.finish(SyncOutcome::NothingToSync)
    }

    fn finish(mut self, outcome: SyncOutcome) -> (Self, Vec<Action>) {
        self.phase = RunPhase::Finished(outcome.clone());
        (self, vec![Action::Finish(outcome)])
    }
}

impl Default for SyncRun {
    fn default() -> Self {
        Self::new()
    }
}
