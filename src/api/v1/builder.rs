//! Workflow builder endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::infrastructure::services::{ActionResult, BuilderAction};

/// POST /v1/builder/actions
///
/// Body is a single action tagged by `action`, e.g.
/// `{"action": "add_node", "session_id": "...", "node": {"type": "set"}}`.
pub async fn handle_action(
    State(state): State<AppState>,
    Json(action): Json<BuilderAction>,
) -> Result<Response, ApiError> {
    debug!(action = action.name(), "Builder action received");

    let result = state.builder.execute(action).await?;
    let status = match result {
        ActionResult::CreateSession(_) => StatusCode::CREATED,
        _ => StatusCode::OK,
    };

    Ok((status, Json(result)).into_response())
}

/// GET /v1/builder/sessions/{session_id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let preview = state.builder.preview_workflow(&session_id).await?;
    Ok(Json(preview).into_response())
}

/// DELETE /v1/builder/sessions/{session_id}
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    state.builder.end_session(&session_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
