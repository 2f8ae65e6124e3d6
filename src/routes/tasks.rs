//! Task submission route
//!
//! `POST /api/v1/tasks` with `{kind, content, options}` where `content` is
//! the base64-encoded document. Every task outcome, including failures, is
//! returned as a `ResultEnvelope` with status 200; only malformed requests
//! get an HTTP error.

use axum::{extract::State, routing::post, Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::worker::{ResultEnvelope, TaskDescriptor, TaskKind, TaskOptions};

/// Create the tasks router
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(submit_task))
}

/// Task submission body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub kind: String,
    /// Base64 document bytes (may be empty for `create`)
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub options: TaskOptions,
}

async fn submit_task(
    State(state): State<AppState>,
    Json(request): Json<TaskRequest>,
) -> Result<Json<ResultEnvelope>> {
    let content = STANDARD.decode(request.content.as_bytes())?;

    let limit = state.config().worker.max_document_bytes;
    if content.len() > limit {
        return Err(AppError::PayloadTooLarge(format!(
            "document is {} bytes, limit is {}",
            content.len(),
            limit
        )));
    }

    let kind = match request.kind.parse::<TaskKind>() {
        Ok(kind) => kind,
        Err(e) => {
            tracing::warn!("Rejected task: {}", e);
            return Ok(Json(ResultEnvelope::failure(Uuid::new_v4().to_string(), &e)));
        }
    };

    let descriptor = TaskDescriptor::from_owned(kind, content, request.options);
    let manager = state.manager();
    let envelope = match state.config().worker.task_timeout() {
        Some(timeout) => manager.submit_with_timeout(descriptor, timeout).await,
        None => manager.submit(descriptor).await,
    };

    Ok(Json(envelope))
}
