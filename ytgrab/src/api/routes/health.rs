//! Health check route.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::models::HealthResponse;
use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}

/// Service status. Degraded when no muxer was found at startup.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.muxer_version.is_some() {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        muxer: state.muxer_version.clone(),
    })
}
