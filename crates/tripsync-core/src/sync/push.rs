//! Push synchronizer
//!
//! Drains the sync queue oldest-first against the remote store. Entries are
//! processed one at a time; an entry is removed only after its remote write
//! succeeds. A failure bumps the entry's retry count and the drain moves on.
//! Entries at or above the retry ceiling are skipped without a remote call.
//!
//! The store lock is never held across a remote call.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::error::{SyncError, SyncResult};
use crate::identity::Identity;
use crate::models::{EntityType, ACCESS_FIELD};
use crate::remote::{DocumentPath, FieldTransform, Fields, RemoteStore};
use crate::storage::queue::{Operation, QueueEntry};
use crate::store::SharedStore;

/// Outcome of one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSummary {
    pub success: usize,
    /// Entries that failed this pass or were skipped at the retry ceiling
    pub failed: usize,
    pub total: usize,
}

/// Uploads queued mutations to the remote store
pub struct PushSynchronizer {
    store: SharedStore,
    remote: Arc<dyn RemoteStore>,
    retry_ceiling: u32,
}

impl PushSynchronizer {
    pub fn new(store: SharedStore, remote: Arc<dyn RemoteStore>, retry_ceiling: u32) -> Self {
        Self {
            store,
            remote,
            retry_ceiling,
        }
    }

    pub fn retry_ceiling(&self) -> u32 {
        self.retry_ceiling
    }

    /// Push every pending entry once
    ///
    /// Per-entry failures are recorded on the entry and counted; only a
    /// failure to read or update the queue itself returns `Err`.
    pub async fn drain(&self, identity: &Identity) -> SyncResult<PushSummary> {
        let entries = self.store.lock().await.pending_entries()?;
        let mut summary = PushSummary {
            total: entries.len(),
            ..PushSummary::default()
        };

        for entry in entries {
            if entry.is_exhausted(self.retry_ceiling) {
                debug!(
                    "Skipping {} {} '{}': {} failed attempts",
                    entry.operation, entry.entity_type, entry.entity_id, entry.retries
                );
                summary.failed += 1;
                continue;
            }

            match self.push_entry(&entry, identity).await {
                Ok(()) => {
                    self.store.lock().await.complete_entry(&entry.id)?;
                    debug!(
                        "Pushed {} {} '{}'",
                        entry.operation, entry.entity_type, entry.entity_id
                    );
                    summary.success += 1;
                }
                Err(e) => {
                    warn!(
                        "Failed to push {} {} '{}' (attempt {}): {}",
                        entry.operation,
                        entry.entity_type,
                        entry.entity_id,
                        entry.retries + 1,
                        e
                    );
                    self.store
                        .lock()
                        .await
                        .record_failure(&entry.id, &e.to_string())?;
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Push complete: {} succeeded, {} failed, {} total",
            summary.success, summary.failed, summary.total
        );
        Ok(summary)
    }

    async fn push_entry(&self, entry: &QueueEntry, identity: &Identity) -> SyncResult<()> {
        let path = DocumentPath::for_entity(
            entry.entity_type,
            &entry.entity_id,
            entry.trip_id.as_deref(),
        )?;

        match entry.operation {
            Operation::Create | Operation::Update => {
                let fields = build_payload(entry, identity)?;
                let transforms = match entry.entity_type {
                    EntityType::Trip => vec![FieldTransform::array_union(
                        ACCESS_FIELD,
                        vec![Value::String(identity.to_string())],
                    )],
                    EntityType::Flight
                    | EntityType::Hotel
                    | EntityType::Activity
                    | EntityType::Restaurant => Vec::new(),
                };
                self.remote.set(&path, fields, transforms).await?;
            }
            Operation::Delete => {
                let result = match entry.entity_type {
                    // Trips are soft-deleted so other members see the removal on pull
                    EntityType::Trip => {
                        let mut fields = Fields::new();
                        fields.insert("deleted".to_string(), Value::Bool(true));
                        stamp(&mut fields, identity);
                        self.remote.update(&path, fields).await
                    }
                    EntityType::Flight
                    | EntityType::Hotel
                    | EntityType::Activity
                    | EntityType::Restaurant => self.remote.delete(&path).await,
                };

                match result {
                    Err(e) if e.is_not_found() => {
                        debug!("{} already gone remotely", path);
                    }
                    other => other?,
                }
            }
        }

        Ok(())
    }
}

/// Remote document body for a create or update entry
pub fn build_payload(entry: &QueueEntry, identity: &Identity) -> SyncResult<Fields> {
    let mut fields = match &entry.data {
        Some(Value::Object(fields)) => fields.clone(),
        Some(_) => {
            return Err(SyncError::InvalidEntry {
                id: entry.id.clone(),
                reason: "data is not a JSON object".to_string(),
            })
        }
        None => {
            return Err(SyncError::InvalidEntry {
                id: entry.id.clone(),
                reason: format!("{} entry has no data", entry.operation),
            })
        }
    };

    fields.insert("id".to_string(), Value::String(entry.entity_id.clone()));
    if let Some(trip_id) = &entry.trip_id {
        fields.insert("trip_id".to_string(), Value::String(trip_id.clone()));
    }
    stamp(&mut fields, identity);

    if entry.entity_type == EntityType::Trip {
        let me = Value::String(identity.to_string());
        let access = fields
            .entry(ACCESS_FIELD.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match access {
            Value::Array(list) => {
                if !list.contains(&me) {
                    list.push(me);
                }
            }
            other => *other = Value::Array(vec![me]),
        }
    }

    Ok(fields)
}

fn stamp(fields: &mut Fields, identity: &Identity) {
    fields.insert(
        "updated_at".to_string(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::AutoSi, true)),
    );
    fields.insert(
        "updated_by".to_string(),
        Value::String(identity.to_string()),
    );
}
