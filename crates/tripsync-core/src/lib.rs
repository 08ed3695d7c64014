//! Tripsync Core Library
//!
//! Offline-first storage for trip itineraries with queued sync to a remote
//! document store.
//!
//! # Architecture
//!
//! - **SQLite**: source of truth on the device. Every local mutation is
//!   written together with a sync queue entry in one transaction.
//! - **Sync queue**: durable, ordered list of mutations waiting for the
//!   remote. Drained by the push synchronizer.
//! - **Remote store**: document database addressed by path
//!   (`trips/{trip_id}/activities/{id}`), reached through [`RemoteStore`].
//!
//! # Quick Start
//!
//! ```text
//! let me = Identity::parse("ana@example.com")?;
//! let mut store = Store::open()?;
//!
//! let trip = store.create(Trip::new("Lisbon"), &me)?;
//! store.create(Activity::new(&trip.id, "Tram 28"), &me)?;
//!
//! let remote = Arc::new(HttpRemote::new("https://sync.example.com", None)?);
//! let sync = SyncOrchestrator::new(store, remote, SyncPolicy::default());
//! sync.push_now(&me).await?;
//! ```
//!
//! # Modules
//!
//! - `store`: local storage interface (main entry point)
//! - `models`: trips and their flights, hotels, activities and restaurants
//! - `storage`: SQLite schema, record tables and the sync queue
//! - `remote`: remote document store contract and clients
//! - `sync`: push, pull and the orchestrator
//! - `events`: callback bus for UI layers
//! - `config`: application configuration

pub mod config;
pub mod events;
pub mod identity;
pub mod models;
pub mod remote;
pub mod storage;
pub mod store;
pub mod sync;

pub use config::Config;
pub use events::{EventBus, SubscriptionId, SyncEvent, SyncStatus};
pub use identity::{Identity, IdentityError};
pub use models::{
    Activity, Entity, EntityType, Flight, Hotel, Itinerary, Restaurant, Trip, UnknownEntityType,
};
pub use remote::{HttpRemote, MemoryRemote, RemoteError, RemoteStore};
pub use storage::{Operation, QueueEntry, QueueStatus, StorageError, StorageResult};
pub use store::{SharedStore, Store, StoreCounts};
pub use sync::{
    OrchestratorHandle, PullSummary, PushSummary, SyncError, SyncOrchestrator, SyncPolicy,
    Trigger,
};
