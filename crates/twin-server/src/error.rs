//! Server-specific error types
//!
//! Every handler returns `Result<_, AppError>`. The response body is always
//! `{ "error": <message>, "status": <code> }`; internal details are logged,
//! never returned.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::DbError;
use crate::storage::StorageError;

/// Result type alias for handler and command code
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(DbError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Storage(StorageError::PathTraversal(_))
            | AppError::Storage(StorageError::InvalidPath(_)) => StatusCode::BAD_REQUEST,
            AppError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) | AppError::Config(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    /// Message safe to show to a client. Used for response bodies and for
    /// per-item batch results.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(DbError::NotFound(message)) => message.clone(),
            AppError::Database(_) => "A database error occurred".to_string(),
            AppError::Storage(StorageError::PathTraversal(_))
            | AppError::Storage(StorageError::InvalidPath(_))
            | AppError::Storage(StorageError::NotFound(_)) => self.inner_message(),
            AppError::Storage(_) => "A storage error occurred".to_string(),
            AppError::Config(_) => "Server configuration error".to_string(),
            AppError::Io(_) => "An IO error occurred".to_string(),
            AppError::NotFound(message)
            | AppError::BadRequest(message)
            | AppError::Unauthorized(message)
            | AppError::Forbidden(message)
            | AppError::Conflict(message)
            | AppError::Internal(message) => message.clone(),
        }
    }

    fn inner_message(&self) -> String {
        match self {
            AppError::Storage(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = ?self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = Json(json!({
            "error": self.public_message(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
