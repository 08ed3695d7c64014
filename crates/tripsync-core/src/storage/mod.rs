//! Storage layer
//!
//! Local SQLite persistence for the five record collections and the sync
//! queue.
//!
//! ## Architecture
//!
//! - **Collections**: one table per entity type, records stored as JSON
//! - **Sync queue**: durable list of mutations awaiting push
//!
//! A local mutation and its queue entry are always written in the same
//! transaction; see [`crate::store::Store`].

pub mod collections;
pub mod error;
pub mod queue;
pub mod schema;

pub use error::{StorageError, StorageResult};
pub use queue::{NewQueueEntry, Operation, QueueEntry, QueueStatus, SyncQueue, UnknownOperation};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
