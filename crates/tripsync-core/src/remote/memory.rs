//! In-memory remote store
//!
//! Holds documents in a map keyed by path and records every call, so tests
//! can assert exactly what reached the remote. It can also simulate the
//! network going down or specific paths failing.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{
    CollectionPath, DocumentPath, FieldTransform, Fields, RemoteDocument, RemoteError,
    RemoteResult, RemoteStore,
};

/// One call made against a [`MemoryRemote`], with its path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Set(String),
    Update(String),
    Delete(String),
    List(String),
    Query(String),
}

impl RemoteCall {
    /// Whether the call writes (set, update, delete)
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            RemoteCall::Set(_) | RemoteCall::Update(_) | RemoteCall::Delete(_)
        )
    }
}

#[derive(Debug, Default)]
struct State {
    documents: BTreeMap<String, Fields>,
    calls: Vec<RemoteCall>,
    offline: bool,
    failing: Vec<String>,
}

impl State {
    fn record(&mut self, call: RemoteCall) {
        self.calls.push(call);
    }

    fn check(&self, path: &str) -> RemoteResult<()> {
        if self.offline {
            return Err(RemoteError::Unavailable("network offline".to_string()));
        }
        if self.failing.iter().any(|prefix| path.starts_with(prefix.as_str())) {
            return Err(RemoteError::Status {
                status: 500,
                message: format!("injected failure for {}", path),
            });
        }
        Ok(())
    }

    fn children_of(&self, collection: &str) -> Vec<RemoteDocument> {
        let prefix = format!("{}/", collection);
        self.documents
            .iter()
            .filter_map(|(path, fields)| {
                let id = path.strip_prefix(&prefix)?;
                if id.contains('/') {
                    return None;
                }
                Some(RemoteDocument {
                    id: id.to_string(),
                    fields: fields.clone(),
                })
            })
            .collect()
    }
}

/// Remote store kept entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<State>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the network going down (or coming back)
    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    /// Make every call whose path starts with `prefix` fail
    pub async fn fail_prefix(&self, prefix: impl Into<String>) {
        self.state.lock().await.failing.push(prefix.into());
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failing.clear();
    }

    /// Seed a document directly, bypassing call recording
    pub async fn insert(&self, path: &str, fields: Fields) {
        self.state
            .lock()
            .await
            .documents
            .insert(path.to_string(), fields);
    }

    pub async fn document(&self, path: &str) -> Option<Fields> {
        self.state.lock().await.documents.get(path).cloned()
    }

    /// Paths of every stored document
    pub async fn paths(&self) -> Vec<String> {
        self.state.lock().await.documents.keys().cloned().collect()
    }

    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().await.calls.clone()
    }

    /// Calls that write, in order
    pub async fn writes(&self) -> Vec<RemoteCall> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.is_write())
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn set(
        &self,
        path: &DocumentPath,
        mut fields: Fields,
        transforms: Vec<FieldTransform>,
    ) -> RemoteResult<()> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        state.record(RemoteCall::Set(path.to_string()));
        state.check(path.as_str())?;

        let previous = state.documents.get(path.as_str());
        for transform in &transforms {
            transform.apply(previous, &mut fields);
        }
        state.documents.insert(path.to_string(), fields);
        Ok(())
    }

    async fn update(&self, path: &DocumentPath, fields: Fields) -> RemoteResult<()> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        state.record(RemoteCall::Update(path.to_string()));
        state.check(path.as_str())?;

        let document = state
            .documents
            .get_mut(path.as_str())
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
        document.extend(fields);
        Ok(())
    }

    async fn delete(&self, path: &DocumentPath) -> RemoteResult<()> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        state.record(RemoteCall::Delete(path.to_string()));
        state.check(path.as_str())?;

        state
            .documents
            .remove(path.as_str())
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))
    }

    async fn list(&self, collection: &CollectionPath) -> RemoteResult<Vec<RemoteDocument>> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        state.record(RemoteCall::List(collection.to_string()));
        state.check(collection.as_str())?;

        Ok(state.children_of(collection.as_str()))
    }

    async fn query_array_contains(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &str,
    ) -> RemoteResult<Vec<RemoteDocument>> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        state.record(RemoteCall::Query(collection.to_string()));
        state.check(collection.as_str())?;

        let needle = Value::String(value.to_string());
        Ok(state
            .children_of(collection.as_str())
            .into_iter()
            .filter(|doc| {
                doc.fields
                    .get(field)
                    .and_then(Value::as_array)
                    .is_some_and(|values| values.contains(&needle))
            })
            .collect())
    }
}
