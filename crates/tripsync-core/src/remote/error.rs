//! Remote store errors

use thiserror::Error;

/// Errors returned by a [`super::RemoteStore`]
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Network down or the store could not be reached
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    #[error("Remote document not found: {0}")]
    NotFound(String),

    /// The store answered with a non-success status
    #[error("Remote store returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    /// A response could not be understood
    #[error("Invalid remote document: {0}")]
    InvalidDocument(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

/// Result type for remote operations
pub type RemoteResult<T> = Result<T, RemoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = RemoteError::Status {
            status: 403,
            message: "permission denied".into(),
        };
        assert_eq!(err.to_string(), "Remote store returned 403: permission denied");
        assert!(RemoteError::NotFound("trips/t1".into()).is_not_found());
    }
}
