use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::shared::types::ApiResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic concurrency conflict; re-read and retry
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether repeating the request can succeed without the caller changing it.
    ///
    /// A `ConcurrentModification` is retryable only after a fresh read, which
    /// the caller is responsible for.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::UpstreamUnavailable(_) | AppError::ConcurrentModification(_) => true,
            AppError::Database(e) => is_transient_db_error(e),
            _ => false,
        }
    }
}

fn is_transient_db_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, errors) = match self {
            AppError::Database(ref e) if is_transient_db_error(e) => {
                tracing::error!("Metadata store unavailable: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Metadata store unavailable".to_string(),
                    None,
                )
            }
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error occurred".to_string(),
                    None,
                )
            }
            AppError::NotFound(ref msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            AppError::AlreadyExists(ref msg) => (StatusCode::CONFLICT, msg.clone(), None),
            AppError::ConcurrentModification(ref msg) => (StatusCode::CONFLICT, msg.clone(), None),
            AppError::Validation(ref msg) => (
                StatusCode::BAD_REQUEST,
                msg.clone(),
                Some(vec![msg.clone()]),
            ),
            AppError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::UpstreamUnavailable(ref msg) => {
                tracing::error!("Upstream unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg.clone(), None)
            }
            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        let body = Json(ApiResponse::<()>::error(Some(message), errors));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
