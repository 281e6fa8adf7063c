//! Context directory: where the list of selectable knowledge contexts comes from.
//!
//! Two payload shapes are in circulation:
//! - `{ "contexts": ["AI Research", ...] }` (canonical, what the gateway emits)
//! - `{ "contexts": { "users": ["AI Research", ...] } }` (older backends)
//!
//! Both are accepted; anything else is a [`DirectoryError::Malformed`].

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::client::{endpoints, join_url, with_trace};
use crate::error::DirectoryError;

/// Source of selectable context identifiers.
#[async_trait]
pub trait ContextDirectory: Send + Sync {
    /// Fetch the current set of contexts, in the order the source returns them.
    async fn list_contexts(&self) -> Result<Vec<String>, DirectoryError>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContextsField {
    Flat(Vec<String>),
    Nested { users: Vec<String> },
}

#[derive(Debug, Deserialize)]
struct ContextsPayload {
    contexts: ContextsField,
}

/// Extract context names from any accepted payload shape.
pub fn parse_contexts(payload: Value) -> Result<Vec<String>, DirectoryError> {
    let parsed: ContextsPayload =
        serde_json::from_value(payload).map_err(|e| DirectoryError::Malformed(e.to_string()))?;

    Ok(match parsed.contexts {
        ContextsField::Flat(list) => list,
        ContextsField::Nested { users } => users,
    })
}

/// Context directory served over HTTP (`GET {base}/api/contexts`).
#[derive(Clone)]
pub struct HttpContextDirectory {
    http: reqwest::Client,
    url: String,
}

impl HttpContextDirectory {
    /// Directory behind the playground gateway at `base_url`.
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self::with_url(http, join_url(base_url, endpoints::CONTEXTS))
    }

    /// Directory at an exact URL (used by the gateway for its upstream).
    pub fn with_url(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ContextDirectory for HttpContextDirectory {
    async fn list_contexts(&self) -> Result<Vec<String>, DirectoryError> {
        let (request, trace_id) = with_trace(self.http.get(&self.url));
        tracing::debug!(trace_id = %trace_id, url = %self.url, "Fetching contexts");

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| DirectoryError::Malformed(e.to_string()))?;
        parse_contexts(body)
    }
}

/// Fixed, in-memory directory.
#[derive(Debug, Clone, Default)]
pub struct StaticContextDirectory {
    contexts: Vec<String>,
}

impl StaticContextDirectory {
    pub fn new<I, S>(contexts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            contexts: contexts.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ContextDirectory for StaticContextDirectory {
    async fn list_contexts(&self) -> Result<Vec<String>, DirectoryError> {
        Ok(self.contexts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_flat_shape() {
        let contexts = parse_contexts(json!({"contexts": ["AI Research", "Robotics"]})).unwrap();
        assert_eq!(contexts, vec!["AI Research", "Robotics"]);
    }

    #[test]
    fn test_parse_nested_shape() {
        let contexts = parse_contexts(json!({"contexts": {"users": ["acme", "globex"]}})).unwrap();
        assert_eq!(contexts, vec!["acme", "globex"]);
    }

    #[test]
    fn test_parse_rejects_missing_key() {
        let err = parse_contexts(json!({"items": ["a"]})).unwrap_err();
        assert!(matches!(err, DirectoryError::Malformed(_)));
    }

    #[test]
    fn test_parse_rejects_wrong_element_type() {
        assert!(parse_contexts(json!({"contexts": [1, 2]})).is_err());
        assert!(parse_contexts(json!({"contexts": {"users": "acme"}})).is_err());
    }

    #[tokio::test]
    async fn test_http_directory_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/contexts"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"contexts": ["Data Science"]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let directory = HttpContextDirectory::new(reqwest::Client::new(), &server.uri());
        let contexts = directory.list_contexts().await.unwrap();
        assert_eq!(contexts, vec!["Data Science"]);
    }

    #[tokio::test]
    async fn test_http_directory_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/contexts"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let directory = HttpContextDirectory::new(reqwest::Client::new(), &server.uri());
        let err = directory.list_contexts().await.unwrap_err();
        assert!(matches!(err, DirectoryError::Status(503)));
    }

    #[tokio::test]
    async fn test_http_directory_non_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/contexts"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let directory = HttpContextDirectory::new(reqwest::Client::new(), &server.uri());
        let err = directory.list_contexts().await.unwrap_err();
        assert!(matches!(err, DirectoryError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_static_directory() {
        let directory = StaticContextDirectory::new(["a", "b"]);
        assert_eq!(directory.list_contexts().await.unwrap(), vec!["a", "b"]);
    }
}
