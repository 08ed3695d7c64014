//! HTTP document protocol message types
//!
//! JSON bodies exchanged with the document store under `/v1/documents/`.

use serde::{Deserialize, Serialize};

use super::{Fields, FieldTransform, RemoteDocument};

/// Protocol version, used as the first URL segment
pub const PROTOCOL_V1: &str = "v1";

/// Body of `PUT {path}`: full replace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRequest {
    pub fields: Fields,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<FieldTransform>,
}

/// Body of `PATCH {path}`: partial merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub fields: Fields,
}

/// Body returned by `GET {collection}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub documents: Vec<RemoteDocument>,
}

/// Error body returned with non-success statuses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorResponse {
    /// Best human-readable description, falling back to the raw body
    pub fn describe(body: &str) -> String {
        match serde_json::from_str::<ErrorResponse>(body) {
            Ok(ErrorResponse {
                message: Some(message),
                ..
            }) => message,
            Ok(ErrorResponse {
                error: Some(error), ..
            }) => error,
            _ if body.trim().is_empty() => "no details".to_string(),
            _ => body.trim().to_string(),
        }
    }
}
