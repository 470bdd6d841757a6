use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use synth_core::SynthError;
use thiserror::Error;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Queue full: {0}")]
    QueueFull(String),

    #[error("Synthesis error: {0}")]
    Synth(SynthError),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<SynthError> for ApiError {
    fn from(e: SynthError) -> Self {
        match e {
            SynthError::QueueFull => ApiError::QueueFull("label queue is at capacity".to_string()),
            SynthError::InvalidLabel(msg) => ApiError::InvalidInput(msg),
            other => ApiError::Synth(other),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::QueueFull(msg) => {
                tracing::warn!("Rejecting request: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            ApiError::Synth(e) => {
                tracing::error!("Synthesis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Synthesis error: {}", e))
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}
