//! HTTP server setup and routing
//!
//! Sets up the Axum HTTP server with routes for status, commands and SSE.

use crate::error::{Error, Result};
use crate::state::SharedState;
use axum::{
    routing::get,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<SharedState>,
}

/// Build the router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))

        // Scheduler status
        .route("/status", get(super::handlers::get_status))

        // Trigger granularity (the set-trigger command)
        .route(
            "/trigger",
            get(super::handlers::get_trigger).post(super::handlers::set_trigger),
        )

        // SSE event stream
        .route("/events", get(super::sse::event_stream))

        .with_state(ctx)
        .layer(TraceLayer::new_for_http())

        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

/// Run the HTTP API server until `shutdown` resolves
pub async fn run(port: u16, state: Arc<SharedState>, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    let app = create_router(AppContext { state });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {}: {}", addr, e);
        Error::Io(e)
    })?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
