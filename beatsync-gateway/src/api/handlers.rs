//! HTTP request handlers

use crate::api::server::AppContext;
use crate::state::SyncStatus;
use axum::{extract::State, http::StatusCode, Json};
use beatsync_common::Granularity;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
    build_timestamp: String,
    build_profile: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    sync: SyncStatus,
    requested_granularity: Granularity,
    triggers_published: u64,
    polls_failed: u64,
    event_subscribers: usize,
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    granularity: String,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    granularity: Granularity,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous: Option<Granularity>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse { error: message.into() }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "beatsync-gateway".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
    })
}

/// GET /status - scheduler status mirror
pub async fn get_status(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    Json(StatusResponse {
        sync: ctx.state.status().await,
        requested_granularity: ctx.state.granularity().await,
        triggers_published: ctx.state.triggers_published(),
        polls_failed: ctx.state.polls_failed(),
        event_subscribers: ctx.state.event_bus().subscriber_count(),
    })
}

/// GET /trigger - requested granularity
pub async fn get_trigger(State(ctx): State<AppContext>) -> Json<TriggerResponse> {
    Json(TriggerResponse {
        granularity: ctx.state.granularity().await,
        previous: None,
    })
}

/// POST /trigger - change the trigger granularity
///
/// Accepts either `{"granularity": "bar"}` or a plain-text body naming the
/// granularity. The scheduler restarts the running session on its next tick.
pub async fn set_trigger(State(ctx): State<AppContext>, body: String) -> Result<Json<TriggerResponse>, ApiError> {
    let requested = match serde_json::from_str::<TriggerRequest>(&body) {
        Ok(request) => request.granularity,
        Err(_) => body.trim().trim_matches('"').to_string(),
    };

    let granularity = requested.parse::<Granularity>().map_err(|e| {
        warn!("Rejected trigger command {:?}: {}", requested, e);
        bad_request(e.to_string())
    })?;

    let previous = ctx.state.set_granularity(granularity).await;
    info!(granularity = %granularity, previous = %previous, "Trigger command received");

    Ok(Json(TriggerResponse {
        granularity,
        previous: Some(previous),
    }))
}
