//! Execution context administration routes

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::state::AppState;
use crate::worker::ContextStats;

/// Create the contexts router
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_contexts).delete(terminate_contexts))
}

#[derive(Debug, Serialize)]
pub struct ContextsResponse {
    pub contexts: Vec<ContextStats>,
}

#[derive(Debug, Serialize)]
pub struct TerminateResponse {
    pub terminated: usize,
}

/// GET /api/v1/contexts
async fn list_contexts(State(state): State<AppState>) -> Json<ContextsResponse> {
    Json(ContextsResponse {
        contexts: state.manager().stats(),
    })
}

/// DELETE /api/v1/contexts
async fn terminate_contexts(State(state): State<AppState>) -> Json<TerminateResponse> {
    Json(TerminateResponse {
        terminated: state.manager().terminate_all(),
    })
}
