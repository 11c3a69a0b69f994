//! # sync-client
//!
//! Device-side engine for wearsync: ingestion, durable storage and the
//! chunked, acknowledgment-aware transfer to the companion host.
//!
//! ## Features
//!
//! - **Non-blocking ingestion**: producers never wait; one consumer batches
//!   samples and flushes them per sensor on a size or time threshold
//! - **Bounded chunks**: backlog is paged from the store and sent in chunks
//!   of at most `page_limit` rows
//! - **Delete after ack**: a range is deleted only after the transport
//!   accepted the chunk that carried it; flushes to a sensor wait while its
//!   page is in flight
//! - **Pluggable collaborators**: `Transport`, `SensorStore` and
//!   `CursorStore` traits, with SQLite, in-memory, spool and mock
//!   implementations
//! - **Pure State Machine**: uses sync-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use wearsync_client::{Config, SqliteStore, SpoolTransport, SyncContext};
//!
//! let config = Config::from_file("wearsync.toml".as_ref())?;
//! let store = Arc::new(SqliteStore::new(&config.storage.database).await?);
//! let transport = SpoolTransport::new("/mnt/host-inbox");
//!
//! let mut context = SyncContext::new(config, transport, store.clone(), store);
//! context.start();
//! context.submit(event)?;
//! let outcome = context.sync_now().await;
//! context.stop().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod ingest;
pub mod locks;
pub mod scheduler;
pub mod store;
pub mod transport;

pub use config::{Config, ConfigError};
pub use context::SyncContext;
pub use controller::{CancelHandle, SyncController};
pub use error::{ClientError, StoreError};
pub use ingest::{spawn_ingestion, FlushReport, IngestError, IngestHandle, IngestTask};
pub use locks::SensorLocks;
pub use scheduler::spawn_periodic_sync;
pub use store::{CursorStore, MemoryCursorStore, MemoryStore, SensorStore, SqliteStore, StoreOp};
pub use transport::{MockTransport, SentMessage, SpoolTransport, Transport, TransportError};
