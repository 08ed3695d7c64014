//! HTTP remote store
//!
//! Speaks the JSON document protocol under `{base}/v1/documents/`:
//!
//! - `PUT {path}` with [`SetRequest`]: full replace
//! - `PATCH {path}` with [`UpdateRequest`]: partial merge
//! - `DELETE {path}`: 404 counts as success
//! - `GET {collection}` returning [`ListResponse`], optionally filtered with
//!   `?field=..&array_contains=..`
//!
//! Path segments are percent-encoded, so an id never spills into the query
//! or fragment.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use tracing::debug;

use super::wire::{ErrorResponse, ListResponse, SetRequest, UpdateRequest, PROTOCOL_V1};
use super::{
    CollectionPath, DocumentPath, FieldTransform, Fields, RemoteDocument, RemoteError,
    RemoteResult, RemoteStore,
};

/// Remote store reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpRemote {
    /// Create a client for the store at `base_url`
    pub fn new(base_url: &str, token: Option<String>) -> RemoteResult<Self> {
        let base_url = base_url.trim();
        let base = Url::parse(base_url).map_err(|e| {
            RemoteError::InvalidPath(format!("invalid remote URL '{}': {}", base_url, e))
        })?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(RemoteError::InvalidPath(format!(
                "remote URL must start with http:// or https:// (got '{}')",
                base_url
            )));
        }

        let client = Client::builder()
            .user_agent(concat!("tripsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    fn url(&self, path: &str) -> RemoteResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RemoteError::InvalidPath(format!("remote URL '{}' cannot hold a path", self.base))
            })?
            .pop_if_empty()
            .push(PROTOCOL_V1)
            .push("documents")
            .extend(path.split('/'));
        Ok(url)
    }

    fn request(&self, method: Method, path: &str) -> RemoteResult<RequestBuilder> {
        let builder = self.client.request(method, self.url(path)?);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send(&self, builder: RequestBuilder, path: &str) -> RemoteResult<Response> {
        let response = builder.send().await.map_err(map_send_error)?;
        let status = response.status();
        debug!("{} -> {}", path, status);

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, path, &body))
    }

    async fn fetch(&self, builder: RequestBuilder, path: &str) -> RemoteResult<Vec<RemoteDocument>> {
        let response = self.send(builder, path).await?;
        let list: ListResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidDocument(format!("{}: {}", path, e)))?;
        Ok(list.documents)
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn set(
        &self,
        path: &DocumentPath,
        fields: Fields,
        transforms: Vec<FieldTransform>,
    ) -> RemoteResult<()> {
        let body = SetRequest { fields, transforms };
        self.send(self.request(Method::PUT, path.as_str())?.json(&body), path.as_str())
            .await?;
        Ok(())
    }

    async fn update(&self, path: &DocumentPath, fields: Fields) -> RemoteResult<()> {
        let body = UpdateRequest { fields };
        self.send(self.request(Method::PATCH, path.as_str())?.json(&body), path.as_str())
            .await?;
        Ok(())
    }

    async fn delete(&self, path: &DocumentPath) -> RemoteResult<()> {
        match self
            .send(self.request(Method::DELETE, path.as_str())?, path.as_str())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, collection: &CollectionPath) -> RemoteResult<Vec<RemoteDocument>> {
        self.fetch(
            self.request(Method::GET, collection.as_str())?,
            collection.as_str(),
        )
        .await
    }

    async fn query_array_contains(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &str,
    ) -> RemoteResult<Vec<RemoteDocument>> {
        let builder = self
            .request(Method::GET, collection.as_str())?
            .query(&[("field", field), ("array_contains", value)]);
        self.fetch(builder, collection.as_str()).await
    }
}

fn map_send_error(error: reqwest::Error) -> RemoteError {
    if error.is_connect() || error.is_timeout() {
        RemoteError::Unavailable(error.to_string())
    } else {
        RemoteError::Http(error)
    }
}

fn status_error(status: StatusCode, path: &str, body: &str) -> RemoteError {
    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(path.to_string()),
        StatusCode::SERVICE_UNAVAILABLE => {
            RemoteError::Unavailable(ErrorResponse::describe(body))
        }
        _ => RemoteError::Status {
            status: status.as_u16(),
            message: ErrorResponse::describe(body),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;

    #[test]
    fn test_url_building() {
        let remote = HttpRemote::new("https://docs.example.com/", None).unwrap();
        assert_eq!(remote.base_url(), "https://docs.example.com");
        assert_eq!(
            remote.url("trips/t1/activities/a1").unwrap().as_str(),
            "https://docs.example.com/v1/documents/trips/t1/activities/a1"
        );

        let remote = HttpRemote::new("https://docs.example.com/api/", None).unwrap();
        assert_eq!(
            remote.url("trips/t1").unwrap().as_str(),
            "https://docs.example.com/api/v1/documents/trips/t1"
        );
    }

    #[test]
    fn test_ids_are_percent_encoded() {
        let remote = HttpRemote::new("https://docs.example.com", None).unwrap();
        let cases = [
            ("a?b", "/v1/documents/trips/a%3Fb"),
            ("a#b", "/v1/documents/trips/a%23b"),
            ("50%off", "/v1/documents/trips/50%25off"),
            ("rio 2025", "/v1/documents/trips/rio%202025"),
        ];

        for (id, expected) in cases {
            let path = DocumentPath::for_entity(EntityType::Trip, id, None).unwrap();
            let request = remote
                .request(Method::PUT, path.as_str())
                .unwrap()
                .build()
                .unwrap();
            assert_eq!(request.url().path(), expected, "id {:?}", id);
            assert!(request.url().query().is_none(), "id {:?}", id);
            assert!(request.url().fragment().is_none(), "id {:?}", id);
        }
    }

    #[test]
    fn test_child_ids_are_percent_encoded() {
        let remote = HttpRemote::new("https://docs.example.com", None).unwrap();
        let path = DocumentPath::for_entity(EntityType::Activity, "a?1", Some("t#1")).unwrap();
        let url = remote.url(path.as_str()).unwrap();
        assert_eq!(url.path(), "/v1/documents/trips/t%231/activities/a%3F1");
    }

    #[test]
    fn test_rejects_non_http_url() {
        assert!(HttpRemote::new("ws://docs.example.com", None).is_err());
        assert!(HttpRemote::new("", None).is_err());
    }

    #[test]
    fn test_empty_token_is_dropped() {
        let remote = HttpRemote::new("http://localhost:8080", Some(String::new())).unwrap();
        assert!(remote.token.is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert!(status_error(StatusCode::NOT_FOUND, "trips/t1", "").is_not_found());
        assert!(matches!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, "trips/t1", ""),
            RemoteError::Unavailable(_)
        ));

        let err = status_error(
            StatusCode::FORBIDDEN,
            "trips/t1",
            r#"{"message":"not on the access list"}"#,
        );
        match err {
            RemoteError::Status { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "not on the access list");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        // Nothing listens on port 9 locally
        let remote = HttpRemote::new("http://127.0.0.1:9", None).unwrap();
        let err = remote.list(&CollectionPath::trips()).await.unwrap_err();
        assert!(
            matches!(err, RemoteError::Unavailable(_) | RemoteError::Http(_)),
            "unexpected error: {err:?}"
        );
    }
}
