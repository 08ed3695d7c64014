//! Pull synchronizer
//!
//! Hydrates local storage from the remote store, typically right after
//! login. Trips are fetched by access list, then each trip's four child
//! collections are fetched concurrently and the whole trip is applied in one
//! local transaction. A failure anywhere in one trip leaves that trip
//! untouched locally and does not stop the others.

use std::sync::Arc;

use futures_util::future::try_join4;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::error::{SyncError, SyncResult};
use crate::identity::Identity;
use crate::models::{
    Activity, Entity, Flight, Hotel, Itinerary, Restaurant, Trip, ACCESS_FIELD,
};
use crate::remote::{CollectionPath, RemoteDocument, RemoteStore};
use crate::store::{ApplyOutcome, SharedStore};

/// Outcome of one pull, counted per trip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullSummary {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
}

/// Downloads every trip the identity can access
pub struct PullSynchronizer {
    store: SharedStore,
    remote: Arc<dyn RemoteStore>,
}

impl PullSynchronizer {
    pub fn new(store: SharedStore, remote: Arc<dyn RemoteStore>) -> Self {
        Self { store, remote }
    }

    /// Pull all accessible trips with their children
    ///
    /// Only the initial trip query failing returns `Err`; per-trip failures
    /// are logged and counted.
    pub async fn pull_all(&self, identity: &Identity) -> SyncResult<PullSummary> {
        let trips = self
            .remote
            .query_array_contains(&CollectionPath::trips(), ACCESS_FIELD, identity.as_str())
            .await?;

        let mut summary = PullSummary {
            total: trips.len(),
            ..PullSummary::default()
        };

        for doc in trips {
            let trip_id = doc.id.clone();
            match self.pull_trip(doc).await {
                Ok(outcome) => {
                    debug!(
                        "Pulled trip '{}': {} written, {} kept local, {} removed",
                        trip_id, outcome.written, outcome.skipped, outcome.removed
                    );
                    summary.success += 1;
                }
                Err(e) => {
                    warn!("Failed to pull trip '{}': {}", trip_id, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Pull complete: {} succeeded, {} failed, {} total",
            summary.success, summary.failed, summary.total
        );
        Ok(summary)
    }

    async fn pull_trip(&self, doc: RemoteDocument) -> SyncResult<ApplyOutcome> {
        let trip: Trip = decode(doc, None)?;

        let (flights, hotels, activities, restaurants) = try_join4(
            self.fetch_children::<Flight>(&trip.id),
            self.fetch_children::<Hotel>(&trip.id),
            self.fetch_children::<Activity>(&trip.id),
            self.fetch_children::<Restaurant>(&trip.id),
        )
        .await?;

        let bundle = Itinerary {
            trip,
            flights,
            hotels,
            activities,
            restaurants,
        };

        let outcome = self.store.lock().await.apply_pulled_trip(&bundle)?;
        Ok(outcome)
    }

    async fn fetch_children<E: Entity>(&self, trip_id: &str) -> SyncResult<Vec<E>> {
        let collection = CollectionPath::children(trip_id, E::TYPE)?;
        let docs = self.remote.list(&collection).await?;
        docs.into_iter()
            .map(|doc| decode(doc, Some(trip_id)))
            .collect()
    }
}

/// Turn a remote document into a record
///
/// The document id, and the parent trip id for children, are filled in when
/// the stored fields omit them.
pub fn decode<E: Entity>(doc: RemoteDocument, trip_id: Option<&str>) -> SyncResult<E> {
    let RemoteDocument { id, mut fields } = doc;

    fields
        .entry("id".to_string())
        .or_insert_with(|| Value::String(id.clone()));
    if let Some(trip_id) = trip_id {
        fields
            .entry("trip_id".to_string())
            .or_insert_with(|| Value::String(trip_id.to_string()));
    }

    serde_json::from_value(Value::Object(fields)).map_err(|source| SyncError::Decode {
        entity_type: E::TYPE,
        id,
        source,
    })
}
