//! Unified storage interface
//!
//! The `Store` owns the SQLite connection and is the only writer of both the
//! record collections and the sync queue. Every mutation:
//!
//! - validates the record (nothing is written on failure)
//! - stamps `updated_at` / `updated_by`
//! - writes the record and enqueues exactly one queue entry in one transaction
//! - emits [`SyncEvent::QueueChanged`] after commit
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = Store::open()?;
//! let me = Identity::parse("ana@example.com")?;
//!
//! let trip = store.create(Trip::new("Lisbon"), &me)?;
//! store.create(Activity::new(&trip.id, "Tram 28"), &me)?;
//!
//! let itinerary = store.itinerary(&trip.id)?;
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::events::{EventBus, SyncEvent};
use crate::identity::Identity;
use crate::models::{
    validate_id, Activity, Entity, EntityType, Flight, Hotel, Itinerary, Restaurant, Trip,
};
use crate::storage::collections;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::queue::{NewQueueEntry, Operation, QueueEntry, QueueStatus, SyncQueue};
use crate::storage::schema::{init_schema, needs_init};

/// Store shared between the CLI, the orchestrator and its spawned runs
pub type SharedStore = Arc<tokio::sync::Mutex<Store>>;

/// Record counts per collection plus the queue size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub trips: usize,
    pub flights: usize,
    pub hotels: usize,
    pub activities: usize,
    pub restaurants: usize,
    pub queued: usize,
}

/// What applying one pulled trip did locally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub written: usize,
    /// Records left alone because a local change is still queued
    pub skipped: usize,
    pub removed: usize,
}

/// Local store for trips, their children and the sync queue
pub struct Store {
    conn: Connection,
    config: Config,
    events: EventBus,
}

impl Store {
    /// Open the store using the default configuration
    pub fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Self::open_with_config(config)
    }

    /// Open the store with a specific configuration
    pub fn open_with_config(config: Config) -> Result<Self> {
        let path = config.sqlite_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open SQLite database at {:?}", path))?;
        Self::from_connection(conn, config)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, Config::default())
    }

    fn from_connection(conn: Connection, config: Config) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        if needs_init(&conn) {
            init_schema(&conn).context("Failed to initialize SQLite schema")?;
        }

        Ok(Self {
            conn,
            config,
            events: EventBus::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Event bus carrying queue changes; the orchestrator emits on it too
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Wrap the store for sharing across tasks
    pub fn into_shared(self) -> SharedStore {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    // ==================== Record Operations ====================

    /// Create a new record and queue it for push
    ///
    /// An empty id is replaced with a fresh UUID. Child records require
    /// their trip to exist locally.
    pub fn create<E: Entity>(&mut self, mut entity: E, by: &Identity) -> StorageResult<E> {
        if entity.id().trim().is_empty() {
            entity.set_id(Uuid::new_v4().to_string());
        }
        entity.validate()?;

        let now = Utc::now();
        entity.meta_mut().created_at = now;
        entity.stamp(by, now);

        let tx = self.conn.transaction()?;

        if collections::exists(&tx, E::TYPE, entity.id())? {
            return Err(StorageError::Validation(format!(
                "{} '{}' already exists",
                E::TYPE,
                entity.id()
            )));
        }
        if let Some(trip_id) = entity.trip_id() {
            if !collections::exists(&tx, EntityType::Trip, trip_id)? {
                return Err(StorageError::not_found(EntityType::Trip, trip_id));
            }
        }

        collections::put(&tx, &entity)?;
        SyncQueue::new(&tx).enqueue(&upsert_entry(Operation::Create, &entity)?)?;
        tx.commit()?;

        debug!("Created {} '{}'", E::TYPE, entity.id());
        self.notify_queue_changed();
        Ok(entity)
    }

    /// Overwrite an existing record and queue the update
    pub fn update<E: Entity>(&mut self, mut entity: E, by: &Identity) -> StorageResult<E> {
        entity.validate()?;

        let tx = self.conn.transaction()?;

        let existing: E = collections::get(&tx, entity.id())?
            .ok_or_else(|| StorageError::not_found(E::TYPE, entity.id()))?;
        if existing.trip_id() != entity.trip_id() {
            return Err(StorageError::Validation(format!(
                "{} '{}' cannot move to another trip",
                E::TYPE,
                entity.id()
            )));
        }

        entity.meta_mut().created_at = existing.meta().created_at;
        entity.stamp(by, Utc::now());

        collections::put(&tx, &entity)?;
        SyncQueue::new(&tx).enqueue(&upsert_entry(Operation::Update, &entity)?)?;
        tx.commit()?;

        debug!("Updated {} '{}'", E::TYPE, entity.id());
        self.notify_queue_changed();
        Ok(entity)
    }

    /// Delete a record and queue the delete
    ///
    /// Deleting a trip removes its children locally; only one trip-level
    /// entry is queued.
    pub fn delete(&mut self, entity_type: EntityType, id: &str, by: &Identity) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        let trip_id = match entity_type {
            EntityType::Trip => {
                if !collections::exists(&tx, EntityType::Trip, id)? {
                    return Err(StorageError::not_found(entity_type, id));
                }
                None
            }
            EntityType::Flight
            | EntityType::Hotel
            | EntityType::Activity
            | EntityType::Restaurant => Some(
                parent_trip(&tx, entity_type, id)?
                    .ok_or_else(|| StorageError::not_found(entity_type, id))?,
            ),
        };

        collections::delete(&tx, entity_type, id)?;
        SyncQueue::new(&tx).enqueue(&NewQueueEntry::delete(entity_type, id, trip_id))?;
        tx.commit()?;

        debug!("Deleted {} '{}' (by {})", entity_type, id, by);
        self.notify_queue_changed();
        Ok(())
    }

    /// Get a record by ID
    pub fn get<E: Entity>(&self, id: &str) -> StorageResult<Option<E>> {
        collections::get(&self.conn, id)
    }

    /// Get all trips, oldest first
    pub fn trips(&self) -> StorageResult<Vec<Trip>> {
        collections::list_all(&self.conn)
    }

    /// Get one child collection of a trip, oldest first
    pub fn children<E: Entity>(&self, trip_id: &str) -> StorageResult<Vec<E>> {
        collections::list_by_trip(&self.conn, trip_id)
    }

    /// Get a trip's activities in display order
    pub fn activities(&self, trip_id: &str) -> StorageResult<Vec<Activity>> {
        let mut activities: Vec<Activity> = self.children(trip_id)?;
        activities.sort_by_key(|a| a.position);
        Ok(activities)
    }

    /// Get a trip together with all four child collections
    pub fn itinerary(&self, trip_id: &str) -> StorageResult<Itinerary> {
        let trip: Trip = self
            .get(trip_id)?
            .ok_or_else(|| StorageError::not_found(EntityType::Trip, trip_id))?;

        Ok(Itinerary {
            trip,
            flights: self.children(trip_id)?,
            hotels: self.children(trip_id)?,
            activities: self.activities(trip_id)?,
            restaurants: self.children(trip_id)?,
        })
    }

    pub fn counts(&self) -> StorageResult<StoreCounts> {
        Ok(StoreCounts {
            trips: collections::count(&self.conn, EntityType::Trip)?,
            flights: collections::count(&self.conn, EntityType::Flight)?,
            hotels: collections::count(&self.conn, EntityType::Hotel)?,
            activities: collections::count(&self.conn, EntityType::Activity)?,
            restaurants: collections::count(&self.conn, EntityType::Restaurant)?,
            queued: SyncQueue::new(&self.conn).count()?,
        })
    }

    // ==================== Trip Operations ====================

    /// Grant another identity access to a trip
    ///
    /// Granting an identity that already has access changes nothing and
    /// queues nothing.
    pub fn share_trip(
        &mut self,
        trip_id: &str,
        grantee: &Identity,
        by: &Identity,
    ) -> StorageResult<Trip> {
        let mut trip: Trip = self
            .get(trip_id)?
            .ok_or_else(|| StorageError::not_found(EntityType::Trip, trip_id))?;

        if !trip.grant(grantee.as_str()) {
            return Ok(trip);
        }
        self.update(trip, by)
    }

    /// Put a trip's activities in the given order
    ///
    /// Listed activities take positions `0..n`; unlisted ones follow in their
    /// current order. Only activities whose position changes are queued.
    pub fn reorder_activities(
        &mut self,
        trip_id: &str,
        ordered_ids: &[String],
        by: &Identity,
    ) -> StorageResult<Vec<Activity>> {
        let current = self.activities(trip_id)?;

        let mut seen = HashSet::new();
        for id in ordered_ids {
            if !seen.insert(id.as_str()) {
                return Err(StorageError::Validation(format!(
                    "activity '{}' listed more than once",
                    id
                )));
            }
            if !current.iter().any(|a| &a.id == id) {
                return Err(StorageError::not_found(EntityType::Activity, id));
            }
        }

        let mut ordered: Vec<Activity> = ordered_ids
            .iter()
            .filter_map(|id| current.iter().find(|a| &a.id == id).cloned())
            .collect();
        ordered.extend(
            current
                .iter()
                .filter(|a| !seen.contains(a.id.as_str()))
                .cloned(),
        );

        let now = Utc::now();
        let tx = self.conn.transaction()?;
        let queue = SyncQueue::new(&tx);
        let mut moved = 0;

        for (position, activity) in ordered.iter_mut().enumerate() {
            let position = position as i64;
            if activity.position == position {
                continue;
            }
            activity.position = position;
            activity.stamp(by, now);
            collections::put(&tx, &*activity)?;
            queue.enqueue(&upsert_entry(Operation::Update, &*activity)?)?;
            moved += 1;
        }

        tx.commit()?;

        debug!("Reordered trip '{}': {} activities moved", trip_id, moved);
        if moved > 0 {
            self.notify_queue_changed();
        }
        Ok(ordered)
    }

    // ==================== Queue Operations ====================

    /// All queued entries, oldest first
    pub fn pending_entries(&self) -> StorageResult<Vec<QueueEntry>> {
        SyncQueue::new(&self.conn).list_pending()
    }

    pub fn queue_status(&self, retry_ceiling: u32) -> StorageResult<QueueStatus> {
        SyncQueue::new(&self.conn).status(retry_ceiling)
    }

    /// Remove an entry whose remote write was confirmed
    pub fn complete_entry(&mut self, id: &str) -> StorageResult<bool> {
        let removed = SyncQueue::new(&self.conn).remove(id)?;
        if removed {
            self.notify_queue_changed();
        }
        Ok(removed)
    }

    /// Record a failed push attempt
    pub fn record_failure(&mut self, id: &str, error: &str) -> StorageResult<bool> {
        SyncQueue::new(&self.conn).increment_retry(id, error)
    }

    /// Drop every queued entry; local records are kept
    pub fn clear_queue(&mut self) -> StorageResult<usize> {
        let cleared = SyncQueue::new(&self.conn).clear()?;
        if cleared > 0 {
            self.notify_queue_changed();
        }
        Ok(cleared)
    }

    pub fn clear_failed(&mut self, retry_ceiling: u32) -> StorageResult<usize> {
        let cleared = SyncQueue::new(&self.conn).clear_failed(retry_ceiling)?;
        if cleared > 0 {
            self.notify_queue_changed();
        }
        Ok(cleared)
    }

    /// Reset exhausted entries so the next push retries them
    pub fn retry_failed(&mut self, retry_ceiling: u32) -> StorageResult<usize> {
        let reset = SyncQueue::new(&self.conn).retry_failed(retry_ceiling)?;
        if reset > 0 {
            self.notify_queue_changed();
        }
        Ok(reset)
    }

    // ==================== Pull ====================

    /// Persist one pulled trip and its children in a single transaction
    ///
    /// Records with a queued local change are left untouched. Local children
    /// missing from the bundle are removed unless they are still queued. A
    /// trip marked deleted remotely is removed with its children.
    pub fn apply_pulled_trip(&mut self, bundle: &Itinerary) -> StorageResult<ApplyOutcome> {
        let trip_id = bundle.trip.id.as_str();
        validate_id(trip_id)?;

        let tx = self.conn.transaction()?;
        let queue = SyncQueue::new(&tx);
        let mut outcome = ApplyOutcome::default();

        if bundle.trip.deleted {
            if queue.has_pending_for(EntityType::Trip, trip_id)? {
                outcome.skipped += 1;
            } else if collections::exists(&tx, EntityType::Trip, trip_id)? {
                for child in EntityType::CHILDREN {
                    outcome.removed += collections::ids_by_trip(&tx, child, trip_id)?.len();
                }
                collections::delete(&tx, EntityType::Trip, trip_id)?;
                outcome.removed += 1;
            }
            tx.commit()?;
            return Ok(outcome);
        }

        bundle.trip.validate()?;
        if queue.has_pending_for(EntityType::Trip, trip_id)? {
            outcome.skipped += 1;
        } else {
            collections::put(&tx, &bundle.trip)?;
            outcome.written += 1;
        }

        if collections::exists(&tx, EntityType::Trip, trip_id)? {
            apply_children(&tx, &queue, trip_id, &bundle.flights, &mut outcome)?;
            apply_children(&tx, &queue, trip_id, &bundle.hotels, &mut outcome)?;
            apply_children(&tx, &queue, trip_id, &bundle.activities, &mut outcome)?;
            apply_children(&tx, &queue, trip_id, &bundle.restaurants, &mut outcome)?;
        } else {
            // Deleted locally with the delete still queued
            outcome.skipped += bundle.item_count();
        }

        tx.commit()?;
        Ok(outcome)
    }

    // ==================== Internal ====================

    fn notify_queue_changed(&self) {
        match SyncQueue::new(&self.conn).count() {
            Ok(pending) => self.events.emit(SyncEvent::QueueChanged { pending }),
            Err(e) => warn!("Failed to count sync queue: {}", e),
        }
    }
}

fn upsert_entry<E: Entity>(operation: Operation, entity: &E) -> StorageResult<NewQueueEntry> {
    Ok(NewQueueEntry::upsert(
        operation,
        E::TYPE,
        entity.id(),
        entity.trip_id().map(str::to_string),
        serde_json::to_value(entity)?,
    ))
}

fn parent_trip(conn: &Connection, entity_type: EntityType, id: &str) -> StorageResult<Option<String>> {
    let trip_id = conn
        .query_row(
            &format!("SELECT trip_id FROM {} WHERE id = ?", entity_type.collection()),
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(trip_id)
}

fn apply_children<E: Entity>(
    conn: &Connection,
    queue: &SyncQueue<'_>,
    trip_id: &str,
    records: &[E],
    outcome: &mut ApplyOutcome,
) -> StorageResult<()> {
    let mut remote_ids = HashSet::new();

    for record in records {
        if record.trip_id() != Some(trip_id) {
            return Err(StorageError::Validation(format!(
                "{} '{}' does not belong to trip '{}'",
                E::TYPE,
                record.id(),
                trip_id
            )));
        }
        record.validate()?;
        remote_ids.insert(record.id());

        if queue.has_pending_for(E::TYPE, record.id())? {
            outcome.skipped += 1;
        } else {
            collections::put(conn, record)?;
            outcome.written += 1;
        }
    }

    for local_id in collections::ids_by_trip(conn, E::TYPE, trip_id)? {
        if remote_ids.contains(local_id.as_str()) || queue.has_pending_for(E::TYPE, &local_id)? {
            continue;
        }
        collections::delete(conn, E::TYPE, &local_id)?;
        outcome.removed += 1;
    }

    Ok(())
}

/// Convenience lookups used by the CLI
impl Store {
    pub fn flights(&self, trip_id: &str) -> StorageResult<Vec<Flight>> {
        self.children(trip_id)
    }

    pub fn hotels(&self, trip_id: &str) -> StorageResult<Vec<Hotel>> {
        self.children(trip_id)
    }

    pub fn restaurants(&self, trip_id: &str) -> StorageResult<Vec<Restaurant>> {
        self.children(trip_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn me() -> Identity {
        Identity::parse("ana@example.com").unwrap()
    }

    fn store_with_trip() -> Store {
        let mut store = Store::open_in_memory().unwrap();
        store.create(Trip::with_id("t1", "Lisbon"), &me()).unwrap();
        store
    }

    fn test_config(temp_dir: &TempDir) -> Config {
        Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn test_open_creates_database_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        Store::open_with_config(config.clone()).unwrap();
        assert!(config.sqlite_path().exists());
    }

    #[test]
    fn test_reopen_keeps_records_and_queue() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);

        {
            let mut store = Store::open_with_config(config.clone()).unwrap();
            store.create(Trip::with_id("t1", "Lisbon"), &me()).unwrap();
        }

        let store = Store::open_with_config(config).unwrap();
        assert!(store.get::<Trip>("t1").unwrap().is_some());
        assert_eq!(store.pending_entries().unwrap().len(), 1);
    }

    #[test]
    fn test_create_stamps_and_queues() {
        let mut store = store_with_trip();
        let activity = store
            .create(Activity::with_id("a1", "t1", "Tram 28"), &me())
            .unwrap();

        assert_eq!(activity.meta.updated_by, "ana@example.com");

        let entries = store.pending_entries().unwrap();
        assert_eq!(entries.len(), 2);
        let entry = &entries[1];
        assert_eq!(entry.entity_type, EntityType::Activity);
        assert_eq!(entry.entity_id, "a1");
        assert_eq!(entry.operation, Operation::Create);
        assert_eq!(entry.trip_id.as_deref(), Some("t1"));
        assert_eq!(entry.data.as_ref().unwrap()["name"], "Tram 28");
    }

    #[test]
    fn test_create_assigns_missing_id() {
        let mut store = store_with_trip();
        let mut hotel = Hotel::new("t1", "Bairro Alto");
        hotel.id = String::new();

        let hotel = store.create(hotel, &me()).unwrap();
        assert!(!hotel.id.is_empty());
        assert!(store.get::<Hotel>(&hotel.id).unwrap().is_some());
    }

    #[test]
    fn test_create_child_without_trip() {
        let mut store = Store::open_in_memory().unwrap();
        let err = store
            .create(Activity::new("missing", "Tram"), &me())
            .unwrap_err();

        assert!(matches!(
            err,
            StorageError::NotFound {
                entity_type: EntityType::Trip,
                ..
            }
        ));
        assert_eq!(store.counts().unwrap(), StoreCounts::default());
    }

    #[test]
    fn test_rejected_mutation_writes_nothing() {
        let mut store = store_with_trip();
        let before = store.counts().unwrap();

        let err = store.create(Hotel::new("t1", "  "), &me()).unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = store
            .create(Trip::with_id("t1", "Duplicate"), &me())
            .unwrap_err();
        assert_eq!(err.kind(), "validation");

        assert_eq!(store.counts().unwrap(), before);
    }

    #[test]
    fn test_update_keeps_created_at() {
        let mut store = store_with_trip();
        let original: Trip = store.get("t1").unwrap().unwrap();

        let mut edited = original.clone();
        edited.name = "Lisbon & Sintra".to_string();
        edited.meta.created_at = Utc::now() + chrono::Duration::days(1);
        let bo = Identity::parse("bo@example.com").unwrap();
        let updated = store.update(edited, &bo).unwrap();

        assert_eq!(updated.meta.created_at, original.meta.created_at);
        assert_eq!(updated.meta.updated_by, "bo@example.com");

        let entries = store.pending_entries().unwrap();
        assert_eq!(entries.last().unwrap().operation, Operation::Update);
    }

    #[test]
    fn test_update_missing_record() {
        let mut store = store_with_trip();
        let err = store.update(Hotel::new("t1", "Ghost"), &me()).unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert_eq!(store.pending_entries().unwrap().len(), 1);
    }

    #[test]
    fn test_update_cannot_move_child() {
        let mut store = store_with_trip();
        store.create(Trip::with_id("t2", "Porto"), &me()).unwrap();
        let mut activity = store
            .create(Activity::with_id("a1", "t1", "Tram"), &me())
            .unwrap();

        activity.trip_id = "t2".to_string();
        assert!(store.update(activity, &me()).is_err());
    }

    #[test]
    fn test_delete_trip_cascades_and_queues_once() {
        let mut store = store_with_trip();
        store.create(Activity::with_id("a1", "t1", "Tram"), &me()).unwrap();
        store.create(Hotel::new("t1", "Bairro"), &me()).unwrap();
        store.clear_queue().unwrap();

        store.delete(EntityType::Trip, "t1", &me()).unwrap();

        let counts = store.counts().unwrap();
        assert_eq!(counts.trips, 0);
        assert_eq!(counts.activities, 0);
        assert_eq!(counts.hotels, 0);

        let entries = store.pending_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, Operation::Delete);
        assert_eq!(entries[0].entity_type, EntityType::Trip);
        assert!(entries[0].data.is_none());
    }

    #[test]
    fn test_delete_child_records_parent() {
        let mut store = store_with_trip();
        store
            .create(Activity::with_id("a1", "t1", "Tram"), &me())
            .unwrap();

        store.delete(EntityType::Activity, "a1", &me()).unwrap();

        let entry = store.pending_entries().unwrap().pop().unwrap();
        assert_eq!(entry.operation, Operation::Delete);
        assert_eq!(entry.trip_id.as_deref(), Some("t1"));
    }

    #[test]
    fn test_delete_missing_record() {
        let mut store = store_with_trip();
        let err = store
            .delete(EntityType::Restaurant, "nope", &me())
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert_eq!(store.pending_entries().unwrap().len(), 1);
    }

    #[test]
    fn test_itinerary_orders_activities_by_position() {
        let mut store = store_with_trip();
        let mut late = Activity::with_id("a1", "t1", "Dinner");
        late.position = 2;
        let mut early = Activity::with_id("a2", "t1", "Breakfast");
        early.position = 0;
        store.create(late, &me()).unwrap();
        store.create(early, &me()).unwrap();
        store.create(Flight::new("t1", "TP 1337"), &me()).unwrap();

        let itinerary = store.itinerary("t1").unwrap();
        let names: Vec<_> = itinerary.activities.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Breakfast", "Dinner"]);
        assert_eq!(itinerary.item_count(), 3);

        assert_eq!(store.itinerary("nope").unwrap_err().kind(), "not_found");
    }

    #[test]
    fn test_share_trip() {
        let mut store = store_with_trip();
        store.clear_queue().unwrap();
        let bo = Identity::parse("bo@example.com").unwrap();

        let trip = store.share_trip("t1", &bo, &me()).unwrap();
        assert!(trip.is_shared_with("bo@example.com"));
        assert_eq!(store.pending_entries().unwrap().len(), 1);

        // Already shared: nothing queued
        store.share_trip("t1", &bo, &me()).unwrap();
        assert_eq!(store.pending_entries().unwrap().len(), 1);
    }

    #[test]
    fn test_reorder_activities() {
        let mut store = store_with_trip();
        for (i, id) in ["a1", "a2", "a3"].iter().enumerate() {
            let mut activity = Activity::with_id(*id, "t1", format!("Stop {}", i));
            activity.position = i as i64;
            store.create(activity, &me()).unwrap();
        }
        store.clear_queue().unwrap();

        let ordered = store
            .reorder_activities("t1", &["a3".to_string(), "a1".to_string()], &me())
            .unwrap();

        let ids: Vec<_> = ordered.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a3", "a1", "a2"]);
        let positions: Vec<_> = store.activities("t1").unwrap().iter().map(|a| a.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);

        // All three moved
        assert_eq!(store.pending_entries().unwrap().len(), 3);
    }

    #[test]
    fn test_reorder_rejects_unknown_and_duplicate_ids() {
        let mut store = store_with_trip();
        store.create(Activity::with_id("a1", "t1", "Tram"), &me()).unwrap();

        let err = store
            .reorder_activities("t1", &["zz".to_string()], &me())
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let err = store
            .reorder_activities("t1", &["a1".to_string(), "a1".to_string()], &me())
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_queue_changed_events() {
        let mut store = Store::open_in_memory().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.events().subscribe(move |event| {
            if let SyncEvent::QueueChanged { pending } = event {
                sink.lock().unwrap().push(*pending);
            }
        });

        store.create(Trip::with_id("t1", "Lisbon"), &me()).unwrap();
        store.create(Activity::with_id("a1", "t1", "Tram"), &me()).unwrap();
        let first = store.pending_entries().unwrap()[0].id.clone();
        store.complete_entry(&first).unwrap();
        // Already removed: no event
        store.complete_entry(&first).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 1]);
    }

    #[test]
    fn test_queue_recovery() {
        let mut store = store_with_trip();
        let entry = store.pending_entries().unwrap().remove(0);
        for _ in 0..3 {
            assert!(store.record_failure(&entry.id, "503").unwrap());
        }

        assert_eq!(store.queue_status(3).unwrap().failed, 1);
        assert_eq!(store.retry_failed(3).unwrap(), 1);
        assert_eq!(store.queue_status(3).unwrap().pending, 1);
        assert_eq!(store.clear_failed(3).unwrap(), 0);
    }

    fn remote_bundle() -> Itinerary {
        let mut trip = Trip::with_id("t1", "Lisbon (remote)");
        trip.shared_with = vec!["ana@example.com".to_string()];
        Itinerary {
            trip,
            flights: vec![],
            hotels: vec![Hotel::new("t1", "Remote Hotel")],
            activities: vec![Activity::with_id("a1", "t1", "Remote tram")],
            restaurants: vec![],
        }
    }

    #[test]
    fn test_apply_pulled_trip_writes_everything() {
        let mut store = Store::open_in_memory().unwrap();

        let outcome = store.apply_pulled_trip(&remote_bundle()).unwrap();
        assert_eq!(
            outcome,
            ApplyOutcome {
                written: 3,
                skipped: 0,
                removed: 0
            }
        );

        let itinerary = store.itinerary("t1").unwrap();
        assert_eq!(itinerary.trip.name, "Lisbon (remote)");
        assert_eq!(itinerary.item_count(), 2);
        // Pulling queues nothing
        assert!(store.pending_entries().unwrap().is_empty());
    }

    #[test]
    fn test_apply_pulled_trip_keeps_pending_local_changes() {
        let mut store = store_with_trip();
        store
            .create(Activity::with_id("a1", "t1", "Local tram"), &me())
            .unwrap();
        store
            .create(Activity::with_id("a9", "t1", "Unpushed"), &me())
            .unwrap();

        let outcome = store.apply_pulled_trip(&remote_bundle()).unwrap();
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.written, 1);
        assert_eq!(outcome.removed, 0);

        let trip: Trip = store.get("t1").unwrap().unwrap();
        assert_eq!(trip.name, "Lisbon");
        let activity: Activity = store.get("a1").unwrap().unwrap();
        assert_eq!(activity.name, "Local tram");
        assert!(store.get::<Activity>("a9").unwrap().is_some());
    }

    #[test]
    fn test_apply_pulled_trip_removes_stale_children() {
        let mut store = store_with_trip();
        store
            .create(Restaurant::new("t1", "Gone remotely"), &me())
            .unwrap();
        store.clear_queue().unwrap();

        let outcome = store.apply_pulled_trip(&remote_bundle()).unwrap();
        assert_eq!(outcome.removed, 1);
        assert!(store.restaurants("t1").unwrap().is_empty());
    }

    #[test]
    fn test_apply_soft_deleted_trip() {
        let mut store = Store::open_in_memory().unwrap();
        store.apply_pulled_trip(&remote_bundle()).unwrap();

        let mut bundle = remote_bundle();
        bundle.trip.deleted = true;
        let outcome = store.apply_pulled_trip(&bundle).unwrap();

        assert_eq!(outcome.removed, 3);
        assert_eq!(store.counts().unwrap(), StoreCounts::default());
    }

    #[test]
    fn test_apply_rejects_foreign_children() {
        let mut store = Store::open_in_memory().unwrap();
        let mut bundle = remote_bundle();
        bundle.hotels.push(Hotel::new("t2", "Elsewhere"));

        assert!(store.apply_pulled_trip(&bundle).is_err());
        // All-or-nothing
        assert_eq!(store.counts().unwrap(), StoreCounts::default());
    }
}
