use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use relq_core::{AckError, EnqueueError, ReceiveError};

/// HTTP-facing error. Every variant renders as `{"error": "<message>"}`
/// with the matching status code.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            // Storage faults are logged with detail but surfaced opaquely.
            ApiError::Internal(detail) => {
                error!(error = %detail, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<EnqueueError> for ApiError {
    fn from(err: EnqueueError) -> Self {
        match err {
            EnqueueError::EmptyQueue | EnqueueError::NullBody => {
                ApiError::BadRequest(err.to_string())
            }
            EnqueueError::Storage(e) => ApiError::Internal(format!("enqueue failed: {e}")),
        }
    }
}

impl From<ReceiveError> for ApiError {
    fn from(err: ReceiveError) -> Self {
        match err {
            ReceiveError::EmptyQueue => ApiError::BadRequest(err.to_string()),
            ReceiveError::Storage(e) => ApiError::Internal(format!("claim failed: {e}")),
        }
    }
}

impl From<AckError> for ApiError {
    fn from(err: AckError) -> Self {
        match err {
            AckError::NotFound(_) => ApiError::NotFound("message not found".to_string()),
            AckError::Storage(e) => ApiError::Internal(format!("ack failed: {e}")),
        }
    }
}
