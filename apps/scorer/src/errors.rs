use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::run::orchestrator::RunError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("A scoring run is already in progress")]
    RunInProgress,

    #[error("Scoring run failed: {0}")]
    RunFailed(String),

    #[error("Lease error: {0}")]
    Lease(#[from] redis::RedisError),
}

impl From<RunError> for AppError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::InProgress => AppError::RunInProgress,
            RunError::Lease(e) => AppError::Lease(e),
            other => AppError::RunFailed(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
            ),
            AppError::RunInProgress => (
                StatusCode::CONFLICT,
                "RUN_IN_PROGRESS",
                "A scoring run is already in progress".to_string(),
            ),
            AppError::RunFailed(msg) => {
                tracing::error!("Scoring run failed: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "RUN_FAILED",
                    "The scoring run failed; see server logs".to_string(),
                )
            }
            AppError::Lease(e) => {
                tracing::error!("Lease error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "LEASE_ERROR",
                    "Could not coordinate the scoring run".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
