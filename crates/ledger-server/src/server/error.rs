use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use ledger_tasks::TaskError;

// ==============================================================================
// Error Type
// ==============================================================================

pub(crate) enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub(super) fn map_task_error(err: TaskError) -> AppError {
    match err {
        TaskError::NoAdapterForChain(_) => AppError::BadRequest(err.to_string()),
        TaskError::Remote(_) => AppError::Internal(err.to_string()),
        TaskError::Cancelled => AppError::Internal(err.to_string()),
    }
}
