use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use charter_core::Error as CoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {0}: {1}")]
    Bind(String, std::io::Error),
    #[error("server error: {0}")]
    Server(String),
}

/// JSON error body. `response` is what a chat client shows the user.
#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    pub error: &'static str,
    pub response: String,
}

/// A failed request, rendered as a status code plus [`ErrorBody`]
#[derive(Debug)]
pub(crate) struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: "invalid_input",
                response: message.into(),
            },
        }
    }

    /// A request axum could not extract. Oversized bodies keep their 413.
    pub(crate) fn rejected(status: StatusCode, message: impl Into<String>) -> Self {
        let mut err = Self::bad_request(message);
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            err.status = status;
        }
        err
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let (status, response) = match &err {
            CoreError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            CoreError::Retrieval(_) | CoreError::Embedding(_) | CoreError::IndexIncompatible(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "The document index is unavailable right now. Please try again later.".to_string(),
            ),
            CoreError::Generation(_) | CoreError::Timeout(_) | CoreError::Network(_) => (
                StatusCode::BAD_GATEWAY,
                "The language model did not respond. Please try again.".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something went wrong while answering your question.".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(kind = err.kind(), error = %err, "request failed");
        } else {
            tracing::debug!(kind = err.kind(), error = %err, "request rejected");
        }

        Self {
            status,
            body: ErrorBody {
                error: err.kind(),
                response,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
