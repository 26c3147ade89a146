use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::UserField;

/// Application error type
///
/// `Clone` because a coalesced load hands the same error to every waiter.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(Arc<sqlx::Error>),

    #[error("Relation store error: {0}")]
    Relation(Arc<redis::RedisError>),

    #[error("Load task aborted: {0}")]
    LoadAborted(String),

    #[error("Unexpected value shape for user field {0}")]
    FieldShape(UserField),

    #[error("User not found")]
    UserNotFound,

    #[error("Video not found")]
    VideoNotFound,

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Too many attempts")]
    RateLimitExceeded,
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(Arc::new(err))
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Relation(Arc::new(err))
    }
}

/// Failures of a cache tier. Never leaves the cache layer: callers log it
/// and fall back to the store.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Implement IntoResponse to convert AppError into HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::Relation(ref e) => {
                tracing::error!("Relation store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::LoadAborted(ref e) => {
                tracing::error!("Load task aborted: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::FieldShape(field) => {
                tracing::error!("Store returned a mismatched value for {}", field);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            AppError::UserNotFound => (StatusCode::NOT_FOUND, "User not found"),
            AppError::VideoNotFound => (StatusCode::NOT_FOUND, "Video not found"),
            AppError::UserAlreadyExists => (StatusCode::CONFLICT, "User already exists"),
            AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid username or password")
            }
            AppError::InvalidInput(ref msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::RateLimitExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many attempts. Please try again later.",
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}

/// Result type alias for application results
pub type Result<T> = std::result::Result<T, AppError>;
