//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to the supervisor for business logic.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::api::response::{api_ok, api_success};
use crate::api::AppState;
use crate::constants::SERVICE_ID;
use crate::error::PerchError;
use crate::spotify::Credentials;
use crate::supervisor::StatusReport;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct VolumeRequest {
    volume: u8,
}

#[derive(Deserialize)]
struct SetupRequest {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/status", get(get_status))
        .route("/api/volume", post(set_volume))
        .route("/api/playback/reclaim", post(reclaim_playback))
        .route("/api/setup", post(setup_credentials))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness endpoint.
async fn health_check() -> impl axum::response::IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Returns the appliance's current status.
async fn get_status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(state.supervisor.status().await)
}

/// Sets the mixer volume.
async fn set_volume(
    State(state): State<AppState>,
    Json(request): Json<VolumeRequest>,
) -> Result<impl axum::response::IntoResponse, PerchError> {
    let applied = state.supervisor.set_volume(request.volume).await?;
    Ok(api_success(json!({ "success": true, "volume": applied })))
}

/// Forces playback back to the appliance's device.
async fn reclaim_playback(
    State(state): State<AppState>,
) -> Result<impl axum::response::IntoResponse, PerchError> {
    state.supervisor.force_reclaim().await?;
    Ok(api_ok())
}

/// Stores new Spotify credentials and re-establishes the backend session.
async fn setup_credentials(
    State(state): State<AppState>,
    Json(request): Json<SetupRequest>,
) -> Result<impl axum::response::IntoResponse, PerchError> {
    let credentials = Credentials {
        client_id: request.client_id,
        client_secret: request.client_secret,
        refresh_token: request.refresh_token,
    };
    let device_claimed = state.supervisor.initialize_session(credentials).await?;
    Ok(api_success(json!({
        "success": true,
        "device_claimed": device_claimed,
    })))
}
