//! Proxy module for the VoicEra gateway.
//!
//! Forwards request bodies verbatim to the backend and relays the answer:
//! - backend 2xx with a JSON body → `200` with that body
//! - backend non-2xx → same status, `{ "error": <backend error or generic> }`
//! - transport failure or non-JSON body → `500 { "error": "Error processing request" }`

use axum::{
    body::Bytes,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use voicera_common::logging::TRACE_ID_HEADER;

/// Error body returned by every gateway endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Generic message when the backend gives no `error` field.
pub const BACKEND_ERROR: &str = "Error from backend";
/// Message when the backend could not be reached or answered garbage.
pub const PROCESSING_ERROR: &str = "Error processing request";

/// Why a forward failed before a backend status could be relayed.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Backend returned a non-JSON body: {0}")]
    InvalidBody(#[from] serde_json::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(PROCESSING_ERROR)),
        )
            .into_response()
    }
}

/// Backend answer, already split into the relay cases.
#[derive(Debug)]
pub enum Relay {
    Success(Value),
    BackendError { status: StatusCode, error: String },
}

impl IntoResponse for Relay {
    fn into_response(self) -> Response {
        match self {
            Self::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            Self::BackendError { status, error } => {
                (status, Json(ErrorResponse::new(error))).into_response()
            }
        }
    }
}

/// Proxy state.
#[derive(Clone)]
pub struct ProxyState {
    pub client: Client,
    pub search_url: Arc<String>,
    pub embed_url: Arc<String>,
}

impl ProxyState {
    /// Create a new proxy state.
    pub fn new(client: Client, search_url: impl Into<String>, embed_url: impl Into<String>) -> Self {
        Self {
            client,
            search_url: Arc::new(search_url.into()),
            embed_url: Arc::new(embed_url.into()),
        }
    }
}

/// Forward `body` to `target_url` as a POST and classify the backend answer.
///
/// The incoming `Content-Type` is kept so multipart uploads reach the
/// backend with their boundary intact.
pub async fn forward(
    client: &Client,
    target_url: &str,
    headers: &HeaderMap,
    body: Bytes,
    trace_id: &str,
) -> Result<Relay, ProxyError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));

    tracing::debug!(
        trace_id = %trace_id,
        target_url = %target_url,
        bytes = body.len(),
        "Proxying request"
    );

    let response = client
        .post(target_url)
        .header(header::CONTENT_TYPE, content_type)
        .header(TRACE_ID_HEADER, trace_id)
        .body(body)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(trace_id = %trace_id, error = %e, "Proxy request failed");
            e
        })?;

    let status = response.status();
    let body_bytes = response.bytes().await?;
    let data: Value = serde_json::from_slice(&body_bytes).map_err(|e| {
        tracing::error!(trace_id = %trace_id, status = status.as_u16(), "Backend body is not JSON");
        e
    })?;

    if status.is_success() {
        return Ok(Relay::Success(data));
    }

    let error = data
        .get("error")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(BACKEND_ERROR)
        .to_string();
    tracing::warn!(trace_id = %trace_id, status = status.as_u16(), %error, "Backend returned an error");

    let status =
        StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok(Relay::BackendError { status, error })
}
