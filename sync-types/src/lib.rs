//! # sync-types
//!
//! Data model and wire format types for wearsync.
//!
//! This crate provides the foundational types used across all wearsync crates:
//! - [`SensorId`], [`BatchId`], [`Timestamp`] - Identity and ordering types
//! - [`SensorEvent`] and [`CsvSerializable`] - Samples and their row encoding
//! - [`ReceivedChunk`] - Host-side view of a wire chunk
//! - [`SyncError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod event;
mod ids;
pub mod wire;

pub use error::SyncError;
pub use event::{CsvSerializable, Field, SensorEvent};
pub use ids::{BatchId, SensorId, Timestamp};
pub use wire::ReceivedChunk;
