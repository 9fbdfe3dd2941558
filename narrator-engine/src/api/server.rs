//! HTTP server setup and routing
//!
//! Sets up the Axum HTTP server with narration control endpoints and the
//! SSE event stream.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::playback::NarrationEngine;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
///
/// Implements Clone, which gives `FromRef<AppContext>` for free via
/// Axum's blanket implementation.
#[derive(Clone)]
pub struct AppContext {
    pub engine: NarrationEngine,
}

/// Router with every route attached
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))

        // Narration control
        .route("/narration/play", post(super::handlers::play))
        .route("/narration/pause", post(super::handlers::pause))
        .route("/narration/resume", post(super::handlers::resume))
        .route("/narration/stop", post(super::handlers::stop))
        .route("/narration/gesture", post(super::handlers::gesture))
        .route("/narration/mute", post(super::handlers::set_mute))
        .route("/narration/state", get(super::handlers::get_state))

        // Prefetch cache
        .route("/prefetch", post(super::handlers::prefetch))
        .route("/prefetch/cancel", post(super::handlers::cancel_prefetch))
        .route("/cache/clear", post(super::handlers::clear_cache))

        // SSE event stream
        .route("/events", get(super::sse::event_stream))

        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

/// Run HTTP API server until `shutdown` resolves
pub async fn run(
    config: &Config,
    engine: NarrationEngine,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = build_router(AppContext { engine });

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid bind address: {}", e)))?;
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
