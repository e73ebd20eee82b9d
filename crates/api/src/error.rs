//! HTTP error mapping for the management and job routes.
//!
//! Every failure leaves the server as `{"error": message, "code": CODE}`.
//! Storage and internal failures are logged in full and answered with a
//! fixed message, so connection strings and SQL never reach a client.
//! Dynamic endpoints do not use this type for snippet failures; those are
//! part of the execution result.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use snipgate_core::error::CoreError;

const STORAGE_UNAVAILABLE: &str = "Storage is temporarily unavailable";
const INTERNAL_FAILURE: &str = "An internal error occurred";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Registry, job or store failure raised by `snipgate_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Malformed input the core never saw: empty source, bad cursor header.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Status, machine code and client-facing message.
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Core(CoreError::NotFound { entity, id }) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{entity} with id {id} not found"),
            ),
            AppError::Core(CoreError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Core(CoreError::Conflict(msg)) => {
                (StatusCode::CONFLICT, "CONFLICT", msg.clone())
            }
            AppError::Core(CoreError::Storage(msg)) => {
                tracing::error!(error = %msg, "Store operation failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORAGE_ERROR",
                    STORAGE_UNAVAILABLE.to_string(),
                )
            }
            AppError::Core(CoreError::Internal(msg)) | AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Request failed internally");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    INTERNAL_FAILURE.to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        (status, axum::Json(json!({"error": message, "code": code}))).into_response()
    }
}
