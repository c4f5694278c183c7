//! Health check endpoints for Kubernetes probes

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::api::types::Json;

use super::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<usize>,
}

#[derive(Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
}

/// Service health, including the number of sessions held in memory
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.builder.sessions().registry().len().await;

    let response = HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: Some(sessions),
    };

    (StatusCode::OK, Json(response))
}

/// Liveness probe - returns 200 while the process is up
pub async fn live_check() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: None,
    };

    (StatusCode::OK, Json(response))
}
