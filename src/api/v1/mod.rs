//! v1 API endpoints

pub mod builder;

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;

/// Create v1 API router
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/builder/actions", post(builder::handle_action))
        .route(
            "/builder/sessions/{session_id}",
            get(builder::get_session).delete(builder::delete_session),
        )
}
