use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Coarse classification of engine failures, shared by every cell so callers
/// can react without matching on cell-specific variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Capacity or working-hours violation; retry with an alternative.
    SlotUnavailable,
    NotFound,
    /// Malformed request rejected before touching any calendar.
    InvalidInterval,
    InvalidTransition,
    DispatchFailure,
    /// Persistence unreachable; nothing was committed.
    StorageUnavailable,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Slot unavailable: {message}")]
    SlotUnavailable { message: String, alternatives: Value },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("External service error: {0}")]
    ExternalService(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, alternatives) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::SlotUnavailable { message, alternatives } => {
                (StatusCode::CONFLICT, message, Some(alternatives))
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg, None),
            AppError::ExternalService(msg) => (StatusCode::BAD_GATEWAY, msg, None),
        };

        if status.is_server_error() {
            tracing::error!("Error: {}: {}", status, message);
        } else {
            tracing::warn!("Error: {}: {}", status, message);
        }

        let body = match alternatives {
            Some(alternatives) => json!({ "error": message, "alternatives": alternatives }),
            None => json!({ "error": message }),
        };

        (status, Json(body)).into_response()
    }
}
