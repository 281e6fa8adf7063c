//! Route definitions for the VoicEra gateway.
//!
//! Provides the endpoints the playground front-end calls: context listing,
//! chat search, document upload, and health checks.

use crate::proxy::{forward, ErrorResponse, ProxyState};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use voicera_common::config::Config;
use voicera_common::logging::{trace_id_from_headers, TRACE_ID_HEADER};
use voicera_session::{ContextDirectory, HttpContextDirectory};

/// Where `/api/contexts` gets its answer.
#[derive(Clone)]
pub enum ContextSource {
    Static(Arc<Vec<String>>),
    Upstream(Arc<HttpContextDirectory>),
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub proxy: ProxyState,
    pub contexts: ContextSource,
}

impl AppState {
    /// Build state from configuration.
    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        let contexts = match config.backend.contexts_url {
            Some(ref url) => {
                ContextSource::Upstream(Arc::new(HttpContextDirectory::with_url(client.clone(), url)))
            }
            None => ContextSource::Static(Arc::new(config.gateway.contexts.clone())),
        };

        Self {
            proxy: ProxyState::new(client, &config.backend.search_url, &config.backend.embed_url),
            contexts,
        }
    }
}

/// Context listing response. Always the flat shape.
#[derive(Debug, Serialize, Deserialize)]
pub struct ContextsResponse {
    pub contexts: Vec<String>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

/// Build the complete router with all routes.
pub fn build_all_routes(config: &Config) -> Router {
    build_routes_with_state(AppState::from_config(config, reqwest::Client::new()), config)
}

/// Build the router around prepared state (tests inject their own client).
pub fn build_routes_with_state(state: AppState, config: &Config) -> Router {
    let api_routes = Router::new()
        .route("/api/contexts", get(contexts_handler))
        .route("/api/search", post(search_handler))
        .route("/api/uploadPdf", post(upload_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.gateway.body_limit_bytes))
        .with_state(state);

    Router::new().merge(api_routes).merge(health_routes())
}

/// Build health check routes.
pub fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/health", get(health_handler))
}

fn with_trace_header(mut response: Response, trace_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(trace_id) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// List selectable contexts.
async fn contexts_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let trace_id = trace_id_from_headers(&headers);

    let response = match state.contexts {
        ContextSource::Static(ref contexts) => Json(ContextsResponse {
            contexts: contexts.as_ref().clone(),
        })
        .into_response(),
        ContextSource::Upstream(ref directory) => match directory.list_contexts().await {
            Ok(contexts) => Json(ContextsResponse { contexts }).into_response(),
            Err(e) => {
                tracing::error!(
                    trace_id = %trace_id,
                    upstream = %directory.url(),
                    error = %e,
                    "Error fetching contexts"
                );
                (
                    StatusCode::BAD_GATEWAY,
                    Json(ErrorResponse::new("Error fetching contexts")),
                )
                    .into_response()
            }
        },
    };

    with_trace_header(response, &trace_id)
}

/// Forward a chat message to the inference backend.
async fn search_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let trace_id = trace_id_from_headers(&headers);
    tracing::info!(trace_id = %trace_id, bytes = body.len(), "Search request received");

    let response = match forward(
        &state.proxy.client,
        &state.proxy.search_url,
        &headers,
        body,
        &trace_id,
    )
    .await
    {
        Ok(relay) => relay.into_response(),
        Err(e) => e.into_response(),
    };

    with_trace_header(response, &trace_id)
}

/// Forward an upload (multipart or JSON) to the embedding backend.
async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let trace_id = trace_id_from_headers(&headers);
    tracing::info!(
        trace_id = %trace_id,
        bytes = body.len(),
        content_type = ?headers.get(axum::http::header::CONTENT_TYPE),
        "Upload received"
    );

    let response = match forward(
        &state.proxy.client,
        &state.proxy.embed_url,
        &headers,
        body,
        &trace_id,
    )
    .await
    {
        Ok(relay) => relay.into_response(),
        Err(e) => e.into_response(),
    };

    with_trace_header(response, &trace_id)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: "voicera-gateway".into(),
    })
}
