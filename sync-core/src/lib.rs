//! # sync-core
//!
//! Pure logic for wearsync (no I/O, instant tests).
//!
//! This crate implements the buffering policy, chunk encoding, cursor
//! bookkeeping and the sync run state machine without any network or
//! disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. Time is passed in by the caller, never read from a
//! global clock (the only exceptions are the random batch id and the
//! `created_at` stamp of a chunk).
//!
//! The actual I/O (storage, transport) is performed by `sync-client`, which
//! interprets the actions produced by these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod cursor;
pub mod encoder;
pub mod state;

pub use buffer::{FlushPolicy, PendingBuffer};
pub use cursor::SyncCursor;
pub use encoder::{complete_page_len, BatchEncoder, Chunk, EncodeError};
pub use state::{Action, Event, RunFailure, RunPhase, RunProgress, SyncOutcome, SyncRun};
