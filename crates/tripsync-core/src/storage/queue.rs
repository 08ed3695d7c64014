//! Sync queue
//!
//! A durable, append-only list of pending mutations. Each local create,
//! update or delete records exactly one entry here, in the same transaction
//! as the record write. The push synchronizer drains entries oldest-first and
//! removes each one only after the remote write is confirmed.
//!
//! Entries are never edited except to bump `retries` and `last_error`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::models::{validate_id, EntityType};
use crate::storage::error::{StorageError, StorageResult};

/// Kind of mutation recorded in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    /// Create and update carry the full record; delete carries nothing
    pub fn carries_data(&self) -> bool {
        !matches!(self, Operation::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown operation name
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown operation: '{0}'")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(UnknownOperation(other.to_string())),
        }
    }
}

/// A stored pending mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub operation: Operation,
    /// Full record for create/update, absent for delete
    pub data: Option<Value>,
    /// Parent trip, required for child entities
    pub trip_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub retries: u32,
    pub last_error: Option<String>,
}

impl QueueEntry {
    /// Whether this entry has used up its attempts
    pub fn is_exhausted(&self, retry_ceiling: u32) -> bool {
        self.retries >= retry_ceiling
    }
}

/// A mutation about to be queued
#[derive(Debug, Clone, PartialEq)]
pub struct NewQueueEntry {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub operation: Operation,
    pub data: Option<Value>,
    pub trip_id: Option<String>,
}

impl NewQueueEntry {
    /// A create or update carrying the full record
    pub fn upsert(
        operation: Operation,
        entity_type: EntityType,
        entity_id: impl Into<String>,
        trip_id: Option<String>,
        data: Value,
    ) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            operation,
            data: Some(data),
            trip_id,
        }
    }

    pub fn delete(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        trip_id: Option<String>,
    ) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            operation: Operation::Delete,
            data: None,
            trip_id,
        }
    }

    /// Reject malformed entries before they reach the queue
    pub fn validate(&self) -> StorageResult<()> {
        validate_id(&self.entity_id)?;

        match (&self.data, self.operation.carries_data()) {
            (None, true) => {
                return Err(StorageError::Validation(format!(
                    "{} entry for {} '{}' requires data",
                    self.operation, self.entity_type, self.entity_id
                )))
            }
            (Some(_), false) => {
                return Err(StorageError::Validation(format!(
                    "delete entry for {} '{}' must not carry data",
                    self.entity_type, self.entity_id
                )))
            }
            (Some(data), true) if !data.is_object() => {
                return Err(StorageError::Validation(format!(
                    "data for {} '{}' must be a JSON object",
                    self.entity_type, self.entity_id
                )))
            }
            _ => {}
        }

        if self.entity_type.is_child() && self.trip_id.is_none() {
            return Err(StorageError::Validation(format!(
                "{} '{}' entry requires a trip_id",
                self.entity_type, self.entity_id
            )));
        }

        Ok(())
    }
}

/// Aggregate queue counts for status displays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Entries still eligible for push
    pub pending: usize,
    /// Entries at or above the retry ceiling
    pub failed: usize,
    pub total: usize,
}

impl QueueStatus {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

const ENTRY_COLUMNS: &str =
    "id, entity_type, entity_id, operation, data, trip_id, created_at, retries, last_error";

/// Queue operations over a connection or an open transaction
pub struct SyncQueue<'c> {
    conn: &'c Connection,
}

impl<'c> SyncQueue<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Append an entry stamped with the current time
    pub fn enqueue(&self, entry: &NewQueueEntry) -> StorageResult<QueueEntry> {
        self.enqueue_at(entry, Utc::now())
    }

    /// Append an entry with an explicit creation time
    pub fn enqueue_at(
        &self,
        entry: &NewQueueEntry,
        created_at: DateTime<Utc>,
    ) -> StorageResult<QueueEntry> {
        entry.validate()?;

        // Stored with millisecond precision
        let created_at = created_at.trunc_subsecs(3);
        let stored = QueueEntry {
            id: Uuid::new_v4().to_string(),
            entity_type: entry.entity_type,
            entity_id: entry.entity_id.clone(),
            operation: entry.operation,
            data: entry.data.clone(),
            trip_id: entry.trip_id.clone(),
            created_at,
            retries: 0,
            last_error: None,
        };

        let data = stored.data.as_ref().map(serde_json::to_string).transpose()?;

        self.conn.execute(
            r#"
            INSERT INTO sync_queue
                (id, entity_type, entity_id, operation, data, trip_id, created_at, retries, last_error)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0, NULL)
            "#,
            params![
                stored.id,
                stored.entity_type.as_str(),
                stored.entity_id,
                stored.operation.as_str(),
                data,
                stored.trip_id,
                created_at.timestamp_millis(),
            ],
        )?;

        debug!(
            "Queued {} {} '{}' as {}",
            stored.operation, stored.entity_type, stored.entity_id, stored.id
        );
        Ok(stored)
    }

    /// All entries, oldest first (insertion order breaks ties)
    pub fn list_pending(&self) -> StorageResult<Vec<QueueEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM sync_queue ORDER BY created_at ASC, rowid ASC",
            ENTRY_COLUMNS
        ))?;

        let entries = stmt
            .query_map([], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn get(&self, id: &str) -> StorageResult<Option<QueueEntry>> {
        let entry = self
            .conn
            .query_row(
                &format!("SELECT {} FROM sync_queue WHERE id = ?", ENTRY_COLUMNS),
                params![id],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Delete one entry; returns false if it was already gone
    pub fn remove(&self, id: &str) -> StorageResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM sync_queue WHERE id = ?", params![id])?;
        Ok(removed > 0)
    }

    /// Record a failed attempt; returns false if the entry no longer exists
    pub fn increment_retry(&self, id: &str, error: &str) -> StorageResult<bool> {
        let updated = self.conn.execute(
            "UPDATE sync_queue SET retries = retries + 1, last_error = ? WHERE id = ?",
            params![error, id],
        )?;
        Ok(updated > 0)
    }

    pub fn count(&self) -> StorageResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn status(&self, retry_ceiling: u32) -> StorageResult<QueueStatus> {
        let (total, failed): (i64, i64) = self.conn.query_row(
            r#"
            SELECT COUNT(*), COALESCE(SUM(CASE WHEN retries >= ? THEN 1 ELSE 0 END), 0)
            FROM sync_queue
            "#,
            params![retry_ceiling],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let total = total as usize;
        let failed = failed as usize;
        Ok(QueueStatus {
            pending: total - failed,
            failed,
            total,
        })
    }

    /// Whether any queued mutation still targets this record
    pub fn has_pending_for(&self, entity_type: EntityType, entity_id: &str) -> StorageResult<bool> {
        let exists = self
            .conn
            .prepare("SELECT 1 FROM sync_queue WHERE entity_type = ? AND entity_id = ? LIMIT 1")?
            .exists(params![entity_type.as_str(), entity_id])?;
        Ok(exists)
    }

    /// Drop every entry; returns how many were removed
    pub fn clear(&self) -> StorageResult<usize> {
        Ok(self.conn.execute("DELETE FROM sync_queue", [])?)
    }

    /// Drop only entries that exhausted their retries
    pub fn clear_failed(&self, retry_ceiling: u32) -> StorageResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM sync_queue WHERE retries >= ?",
            params![retry_ceiling],
        )?)
    }

    /// Give exhausted entries a fresh set of attempts
    pub fn retry_failed(&self, retry_ceiling: u32) -> StorageResult<usize> {
        Ok(self.conn.execute(
            "UPDATE sync_queue SET retries = 0 WHERE retries >= ?",
            params![retry_ceiling],
        )?)
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<QueueEntry> {
    let entity_type: String = row.get(1)?;
    let operation: String = row.get(3)?;
    let data: Option<String> = row.get(4)?;
    let created_at: i64 = row.get(6)?;

    let entity_type = entity_type
        .parse::<EntityType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    let operation = operation
        .parse::<Operation>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let data = data
        .map(|d| serde_json::from_str::<Value>(&d))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    let created_at = DateTime::from_timestamp_millis(created_at).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            Type::Integer,
            format!("timestamp {} out of range", created_at).into(),
        )
    })?;

    Ok(QueueEntry {
        id: row.get(0)?,
        entity_type,
        entity_id: row.get(2)?,
        operation,
        data,
        trip_id: row.get(5)?,
        created_at,
        retries: row.get(7)?,
        last_error: row.get(8)?,
    })
}
