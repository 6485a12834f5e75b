//! Health check and diagnostics endpoints

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::diagnostics::{ApiKeyFlags, FeatureFlags};
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("emotabi-server")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    pub api_keys: ApiKeyFlags,
    pub features: FeatureFlags,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let report = state.capabilities();

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "emotabi-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        api_keys: report.api_keys(),
        features: report.features(),
    })
}

#[derive(Debug, Serialize)]
pub struct DebugResponse {
    pub status: String,
    pub message: String,
    pub timestamp: i64,
}

/// GET /debug
///
/// Re-runs the startup diagnostics into the service log.
pub async fn debug_diagnostics(State(state): State<AppState>) -> Json<DebugResponse> {
    state.capabilities().log();

    Json(DebugResponse {
        status: "debug_completed".to_string(),
        message: "詳細診断をログに出力しました".to_string(),
        timestamp: Utc::now().timestamp(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/debug", get(debug_diagnostics))
}
