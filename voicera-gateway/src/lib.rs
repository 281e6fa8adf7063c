//! VoicEra Gateway - Pass-through server behind the playground front-end.
//!
//! Three API routes, each a thin relay:
//! - `GET  /api/contexts`  → static list or upstream context directory
//! - `POST /api/search`    → inference backend (`backend.search_url`)
//! - `POST /api/uploadPdf` → embedding backend (`backend.embed_url`)
//!
//! ## Architecture
//!
//! ```text
//! Browser / CLI → Gateway (trace id → body limit → forward) → Backend
//!                                  ↓
//!                    relay 2xx JSON or { "error": ... }
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod proxy;
pub mod routes;

pub use proxy::{ErrorResponse, ProxyError, ProxyState, Relay};
pub use routes::{AppState, ContextSource, ContextsResponse, HealthResponse};

use axum::Router;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use voicera_common::config::Config;

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the gateway router with all routes and middleware.
pub fn build_router(config: &Config) -> Router {
    routes::build_all_routes(config).layer(cors_layer())
}

/// Build the gateway router around prepared state.
pub fn build_router_with_state(state: AppState, config: &Config) -> Router {
    routes::build_routes_with_state(state, config).layer(cors_layer())
}

/// Start the gateway server and run until Ctrl-C.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.bind_address().parse::<std::net::IpAddr>()?,
        config.gateway.port,
    ));

    let router = build_router(config);

    tracing::info!(
        %addr,
        search_url = %config.backend.search_url,
        embed_url = %config.backend.embed_url,
        "Starting VoicEra Gateway"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("VoicEra Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
