//! Sync errors

use thiserror::Error;

use crate::models::EntityType;
use crate::remote::RemoteError;
use crate::storage::error::StorageError;

/// Errors raised while pushing or pulling
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A remote document could not be turned into a record
    #[error("Failed to decode {entity_type} '{id}': {source}")]
    Decode {
        entity_type: EntityType,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// A queue entry cannot be turned into a remote write
    #[error("Queue entry '{id}' is malformed: {reason}")]
    InvalidEntry { id: String, reason: String },
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
