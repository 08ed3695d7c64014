//! Remote document store
//!
//! The cloud side of sync: an authenticated document database addressed by
//! slash-separated paths. Trips live at `trips/{id}` and each child
//! collection is nested under its trip, e.g. `trips/{trip_id}/activities/{id}`.
//!
//! Implementations:
//! - [`HttpRemote`]: JSON over HTTP (reqwest)
//! - [`MemoryRemote`]: in-process, used by tests and dry runs

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{validate_id, EntityType};

pub mod error;
pub mod http;
pub mod memory;
pub mod wire;

pub use error::{RemoteError, RemoteResult};
pub use http::HttpRemote;
pub use memory::{MemoryRemote, RemoteCall};

/// Document body: a JSON object
pub type Fields = serde_json::Map<String, Value>;

/// Path of a single document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath(String);

impl DocumentPath {
    pub fn trip(trip_id: &str) -> RemoteResult<Self> {
        check_segment(trip_id)?;
        Ok(Self(format!("{}/{}", EntityType::Trip.collection(), trip_id)))
    }

    /// Path for any record, given its parent trip for child types
    pub fn for_entity(
        entity_type: EntityType,
        id: &str,
        trip_id: Option<&str>,
    ) -> RemoteResult<Self> {
        check_segment(id)?;
        match (entity_type, trip_id) {
            (EntityType::Trip, _) => Self::trip(id),
            (child, Some(trip_id)) => Ok(Self(format!(
                "{}/{}",
                CollectionPath::children(trip_id, child)?,
                id
            ))),
            (child, None) => Err(RemoteError::InvalidPath(format!(
                "{} '{}' has no parent trip",
                child, id
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path of a collection of documents
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn trips() -> Self {
        Self(EntityType::Trip.collection().to_string())
    }

    /// A child collection nested under a trip
    pub fn children(trip_id: &str, entity_type: EntityType) -> RemoteResult<Self> {
        check_segment(trip_id)?;
        if !entity_type.is_child() {
            return Err(RemoteError::InvalidPath(format!(
                "{} is not nested under a trip",
                entity_type
            )));
        }
        Ok(Self(format!(
            "{}/{}/{}",
            EntityType::Trip.collection(),
            trip_id,
            entity_type.collection()
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn check_segment(segment: &str) -> RemoteResult<()> {
    validate_id(segment).map_err(|e| RemoteError::InvalidPath(e.to_string()))
}

/// A document as returned by list and query operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
}

/// Server-side modification applied while writing a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FieldTransform {
    /// Merge `values` into the array stored at `field`, never removing
    ArrayUnion { field: String, values: Vec<Value> },
}

impl FieldTransform {
    pub fn array_union(field: impl Into<String>, values: Vec<Value>) -> Self {
        FieldTransform::ArrayUnion {
            field: field.into(),
            values,
        }
    }

    /// Apply to `fields` as they are about to replace `previous`
    pub fn apply(&self, previous: Option<&Fields>, fields: &mut Fields) {
        match self {
            FieldTransform::ArrayUnion { field, values } => {
                let mut merged: Vec<Value> = previous
                    .and_then(|p| p.get(field))
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();

                let incoming = fields
                    .get(field)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();

                for value in incoming.into_iter().chain(values.iter().cloned()) {
                    if !merged.contains(&value) {
                        merged.push(value);
                    }
                }
                fields.insert(field.clone(), Value::Array(merged));
            }
        }
    }
}

/// An authenticated remote document database
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Replace a document, creating it if absent
    async fn set(
        &self,
        path: &DocumentPath,
        fields: Fields,
        transforms: Vec<FieldTransform>,
    ) -> RemoteResult<()>;

    /// Merge fields into an existing document
    async fn update(&self, path: &DocumentPath, fields: Fields) -> RemoteResult<()>;

    async fn delete(&self, path: &DocumentPath) -> RemoteResult<()>;

    /// Documents directly under a collection
    async fn list(&self, collection: &CollectionPath) -> RemoteResult<Vec<RemoteDocument>>;

    /// Documents whose array `field` contains `value`
    async fn query_array_contains(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &str,
    ) -> RemoteResult<Vec<RemoteDocument>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_paths() {
        let path = DocumentPath::for_entity(EntityType::Activity, "a1", Some("t1")).unwrap();
        assert_eq!(path.as_str(), "trips/t1/activities/a1");

        let path = DocumentPath::for_entity(EntityType::Trip, "t1", None).unwrap();
        assert_eq!(path.to_string(), "trips/t1");
    }

    #[test]
    fn test_invalid_paths() {
        assert!(DocumentPath::for_entity(EntityType::Hotel, "h1", None).is_err());
        assert!(DocumentPath::trip("a/b").is_err());
        assert!(DocumentPath::trip("").is_err());
        assert!(CollectionPath::children("t1", EntityType::Trip).is_err());
    }

    #[test]
    fn test_array_union_keeps_previous_values() {
        let previous = fields(json!({ "shared_with": ["ana@example.com", "bo@example.com"] }));
        let mut incoming = fields(json!({ "name": "Lisbon", "shared_with": ["cy@example.com"] }));

        FieldTransform::array_union("shared_with", vec![json!("ana@example.com")])
            .apply(Some(&previous), &mut incoming);

        assert_eq!(
            incoming["shared_with"],
            json!(["ana@example.com", "bo@example.com", "cy@example.com"])
        );
    }

    #[test]
    fn test_array_union_on_new_document() {
        let mut incoming = fields(json!({ "name": "Lisbon" }));
        FieldTransform::array_union("shared_with", vec![json!("ana@example.com")])
            .apply(None, &mut incoming);
        assert_eq!(incoming["shared_with"], json!(["ana@example.com"]));
    }

    #[test]
    fn test_transform_wire_shape() {
        let t = FieldTransform::array_union("shared_with", vec![json!("ana@example.com")]);
        assert_eq!(
            serde_json::to_value(&t).unwrap(),
            json!({ "op": "array_union", "field": "shared_with", "values": ["ana@example.com"] })
        );
    }
}
