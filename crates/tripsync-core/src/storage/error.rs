//! Storage error handling
//!
//! Provides typed errors for local storage operations with descriptive
//! messages and recovery suggestions. Local CRUD returns these to the caller
//! instead of panicking so a UI can render them inline.

use std::io;
use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::models::EntityType;

/// Errors that can occur during local storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Input rejected before anything was written or queued
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A referenced record does not exist locally
    #[error("{entity_type} '{id}' not found")]
    NotFound { entity_type: EntityType, id: String },

    /// The local database ran out of space
    #[error("Local storage quota exceeded: {source}. Free up disk space and try again.")]
    QuotaExceeded {
        #[source]
        source: rusqlite::Error,
    },

    /// Failed to create data directory
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Any other SQLite failure
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// A stored record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(error: rusqlite::Error) -> Self {
        if is_quota_error(&error) {
            StorageError::QuotaExceeded { source: error }
        } else {
            StorageError::Database(error)
        }
    }
}

impl StorageError {
    pub fn not_found(entity_type: EntityType, id: impl Into<String>) -> Self {
        StorageError::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Short machine-readable category
    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::Validation(_) => "validation",
            StorageError::NotFound { .. } => "not_found",
            StorageError::QuotaExceeded { .. } => "quota_exceeded",
            StorageError::CreateDirectory { .. } => "io",
            StorageError::Database(_) => "database",
            StorageError::Serialization(_) => "serialization",
        }
    }

    /// Check if the user can fix this without losing data
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StorageError::Validation(_)
                | StorageError::NotFound { .. }
                | StorageError::QuotaExceeded { .. }
                | StorageError::CreateDirectory { .. }
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::Validation(_) => Some("Correct the highlighted fields and try again."),
            StorageError::NotFound { .. } => {
                Some("The record may have been deleted; refresh and try again.")
            }
            StorageError::QuotaExceeded { .. } => Some("Free up disk space and try again."),
            StorageError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            _ => None,
        }
    }
}

/// Check if a SQLite error indicates the disk or quota is full
fn is_quota_error(error: &rusqlite::Error) -> bool {
    if let rusqlite::Error::SqliteFailure(inner, _) = error {
        if inner.code == ErrorCode::DiskFull {
            return true;
        }
    }
    let msg = error.to_string().to_lowercase();
    msg.contains("disk is full") || msg.contains("quota exceeded") || msg.contains("no space left")
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
