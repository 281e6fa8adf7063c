//! Inference gateway client.
//!
//! The backend answers `{ "completion": "..." }`; some deployments still
//! answer `{ "response": "..." }`, which is accepted as well.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::client::{endpoints, join_url, with_trace};
use crate::error::GatewayError;

/// Body of one inference request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Knowledge context the answer is grounded in.
    #[serde(rename = "user_id", alias = "context")]
    pub context: String,
    pub message: String,
    /// Telephony call id, forwarded untouched when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_sid: Option<String>,
}

impl CompletionRequest {
    pub fn new(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            message: message.into(),
            call_sid: None,
        }
    }

    pub fn with_call_sid(mut self, call_sid: impl Into<String>) -> Self {
        self.call_sid = Some(call_sid.into());
        self
    }
}

/// Something that turns a message into an assistant reply.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct CompletionBody {
    #[serde(alias = "response")]
    completion: String,
}

/// Extract the reply text from a successful gateway body.
pub fn parse_completion(body: &[u8]) -> Result<String, GatewayError> {
    serde_json::from_slice::<CompletionBody>(body)
        .map(|b| b.completion)
        .map_err(|e| GatewayError::MalformedBody(e.to_string()))
}

/// Inference over HTTP (`POST {base}/api/search`).
#[derive(Clone)]
pub struct HttpInferenceGateway {
    http: reqwest::Client,
    url: String,
}

impl HttpInferenceGateway {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            url: join_url(base_url, endpoints::SEARCH),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl InferenceGateway for HttpInferenceGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        let (builder, trace_id) = with_trace(self.http.post(&self.url).json(request));
        let span = voicera_common::api_call_span!(trace_id, endpoint = %self.url, method = "POST");

        async move {
            let started = std::time::Instant::now();
            let response = builder.send().await?;
            let status = response.status();
            let body = response.bytes().await?;

            tracing::debug!(
                status = status.as_u16(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Gateway responded"
            );

            if !status.is_success() {
                return Err(GatewayError::Status {
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
            }

            parse_completion(&body)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_request_wire_format() {
        let request = CompletionRequest::new("AI Research", "hello");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, json!({"user_id": "AI Research", "message": "hello"}));

        let with_sid = request.with_call_sid("CA123");
        let json = serde_json::to_value(&with_sid).unwrap();
        assert_eq!(json["call_sid"], "CA123");
    }

    #[test]
    fn test_request_accepts_context_alias() {
        let parsed: CompletionRequest =
            serde_json::from_value(json!({"context": "Robotics", "message": "hi"})).unwrap();
        assert_eq!(parsed.context, "Robotics");
        assert!(parsed.call_sid.is_none());
    }

    #[test]
    fn test_parse_completion_field_names() {
        assert_eq!(parse_completion(br#"{"completion":"hi there"}"#).unwrap(), "hi there");
        assert_eq!(parse_completion(br#"{"response":"legacy"}"#).unwrap(), "legacy");
        assert!(matches!(
            parse_completion(br#"{"answer":"nope"}"#),
            Err(GatewayError::MalformedBody(_))
        ));
        assert!(parse_completion(b"not json").is_err());
    }

    #[tokio::test]
    async fn test_complete_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/search"))
            .and(header_exists("x-trace-id"))
            .and(body_json(json!({"user_id": "AI Research", "message": "hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"completion": "hi there"})))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = HttpInferenceGateway::new(reqwest::Client::new(), &server.uri());
        let reply = gateway
            .complete(&CompletionRequest::new("AI Research", "hello"))
            .await
            .unwrap();
        assert_eq!(reply, "hi there");
    }

    #[tokio::test]
    async fn test_complete_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/search"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let gateway = HttpInferenceGateway::new(reqwest::Client::new(), &server.uri());
        let err = gateway
            .complete(&CompletionRequest::new("AI Research", "hello"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert!(matches!(err, GatewayError::Status { ref body, .. } if body == "boom"));
    }

    #[tokio::test]
    async fn test_complete_unreachable() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let gateway =
            HttpInferenceGateway::new(reqwest::Client::new(), &format!("http://127.0.0.1:{port}"));
        let err = gateway
            .complete(&CompletionRequest::new("AI Research", "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }
}
