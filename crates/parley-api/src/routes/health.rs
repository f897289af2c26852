//! Health check endpoint — for load balancers, monitoring, and Docker health checks.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    online_users: usize,
    active_voice_channels: usize,
}

/// Health check router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        online_users: state.registry.online_count().await,
        active_voice_channels: state.tracker.get_all().await.len(),
    })
}
