use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::{Deserialize, Serialize};

use charter_chat::Answer;

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResetRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResetResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    indexed_chunks: usize,
    uptime_secs: u64,
}

pub(crate) async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Answer>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::rejected(e.status(), e.body_text()))?;
    let answer = state
        .chat
        .ask(request.session_id.as_deref(), &request.message)
        .await?;
    Ok(Json(answer))
}

/// The body is optional; an empty one resets the default session
pub(crate) async fn reset_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ResetResponse>, ApiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ResetRequest::default()
    } else {
        serde_json::from_slice::<ResetRequest>(&body)
            .map_err(|e| ApiError::bad_request(format!("invalid reset request: {e}")))?
    };

    state.chat.reset(request.session_id.as_deref()).await;
    Ok(Json(ResetResponse { status: "cleared" }))
}

pub(crate) async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, ApiError> {
    Ok(Json(HealthResponse {
        status: "ok",
        indexed_chunks: state.chat.indexed_chunks().await?,
        uptime_secs: state.started_at.elapsed().as_secs(),
    }))
}
