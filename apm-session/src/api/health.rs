//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" when the resolved service answered its liveness probe, else "degraded"
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Base URL the session talks to
    pub service_url: String,
    pub service_live: bool,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let status = if state.endpoint.live { "ok" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        module: "apm-session".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        service_url: state.endpoint.base_url.clone(),
        service_live: state.endpoint.live,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
