//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - Camera start/stop and live frame access
//! - Detection history and daily counters
//! - Manual door open
//! - WebSocket transport for the realtime hub

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::{ApiResponse, HealthResponse, SystemStatus};
use crate::state::AppState;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        active_cameras: state.supervisor.active_count().await,
        ws_connections: state.realtime.connection_count(),
    };

    Json(response)
}

/// Latest system health sample plus active camera count
pub async fn system_status(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.system_health.read().await.clone();
    let status = SystemStatus {
        cpu_percent: health.cpu_percent,
        memory_percent: health.memory_percent,
        memory_used_gb: health.memory_used_bytes as f64 / BYTES_PER_GB,
        memory_total_gb: health.memory_total_bytes as f64 / BYTES_PER_GB,
        overloaded: health.overloaded,
        active_cameras: state.supervisor.active_count().await,
    };

    Json(ApiResponse::success(status))
}
