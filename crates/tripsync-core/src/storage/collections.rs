//! Record collection tables
//!
//! Every collection is a table of JSON documents keyed by `id`, with the
//! timestamps and (for child collections) the parent `trip_id` lifted into
//! columns for indexing. Writes use an upsert rather than `INSERT OR REPLACE`:
//! a replace deletes the old row first, which would fire the cascade and wipe
//! a trip's children.

use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{Entity, EntityType};
use crate::storage::error::StorageResult;

/// Fetch one record by id
pub fn get<E: Entity>(conn: &Connection, id: &str) -> StorageResult<Option<E>> {
    let data: Option<String> = conn
        .query_row(
            &format!("SELECT data FROM {} WHERE id = ?", E::TYPE.collection()),
            params![id],
            |row| row.get(0),
        )
        .optional()?;

    match data {
        Some(data) => Ok(Some(serde_json::from_str(&data)?)),
        None => Ok(None),
    }
}

pub fn exists(conn: &Connection, entity_type: EntityType, id: &str) -> StorageResult<bool> {
    let found = conn
        .prepare(&format!(
            "SELECT 1 FROM {} WHERE id = ? LIMIT 1",
            entity_type.collection()
        ))?
        .exists(params![id])?;
    Ok(found)
}

/// Insert or overwrite a record in place
pub fn put<E: Entity>(conn: &Connection, entity: &E) -> StorageResult<()> {
    let data = serde_json::to_string(entity)?;
    let meta = entity.meta();
    let created_at = meta.created_at.timestamp_millis();
    let updated_at = meta.updated_at.timestamp_millis();
    let table = E::TYPE.collection();

    match entity.trip_id() {
        Some(trip_id) => {
            conn.execute(
                &format!(
                    r#"
                    INSERT INTO {table} (id, trip_id, data, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(id) DO UPDATE SET
                        trip_id = excluded.trip_id,
                        data = excluded.data,
                        updated_at = excluded.updated_at
                    "#
                ),
                params![entity.id(), trip_id, data, created_at, updated_at],
            )?;
        }
        None => {
            conn.execute(
                &format!(
                    r#"
                    INSERT INTO {table} (id, data, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(id) DO UPDATE SET
                        data = excluded.data,
                        updated_at = excluded.updated_at
                    "#
                ),
                params![entity.id(), data, created_at, updated_at],
            )?;
        }
    }

    Ok(())
}

/// Remove one record; returns false if it did not exist
pub fn delete(conn: &Connection, entity_type: EntityType, id: &str) -> StorageResult<bool> {
    let removed = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?", entity_type.collection()),
        params![id],
    )?;
    Ok(removed > 0)
}

/// All records of a collection, oldest first
pub fn list_all<E: Entity>(conn: &Connection) -> StorageResult<Vec<E>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT data FROM {} ORDER BY created_at ASC, rowid ASC",
        E::TYPE.collection()
    ))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    rows.iter()
        .map(|data| Ok(serde_json::from_str(data)?))
        .collect()
}

/// Child records of one trip, oldest first
pub fn list_by_trip<E: Entity>(conn: &Connection, trip_id: &str) -> StorageResult<Vec<E>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT data FROM {} WHERE trip_id = ? ORDER BY created_at ASC, rowid ASC",
        E::TYPE.collection()
    ))?;
    let rows = stmt
        .query_map(params![trip_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    rows.iter()
        .map(|data| Ok(serde_json::from_str(data)?))
        .collect()
}

/// Ids of a child collection's records under one trip
pub fn ids_by_trip(
    conn: &Connection,
    entity_type: EntityType,
    trip_id: &str,
) -> StorageResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM {} WHERE trip_id = ?",
        entity_type.collection()
    ))?;
    let ids = stmt
        .query_map(params![trip_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

pub fn count(conn: &Connection, entity_type: EntityType) -> StorageResult<usize> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", entity_type.collection()),
        [],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}
