//! Error handling for the campaign mapper

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Sign-in rejected by the remote system
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Operation attempted in the wrong session state
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// A workflow checkpoint did not see its expected marker
    #[error("Unexpected response in {operation} at checkpoint '{checkpoint}': {message}")]
    ResponseValidation {
        operation: String,
        checkpoint: String,
        message: String,
    },

    /// Referenced set/account/campaign absent locally
    #[error("Not found: {0}")]
    NotFound(String),

    /// Set label or account email collision
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Quota exceeded
    #[error("Overflow: {0}")]
    Overflow(String),

    /// Invalid caller input (empty keyword list, non-positive day count, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// SQLx database error
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl Error {
    /// Checkpoint mismatch helper
    pub fn unexpected(
        operation: impl Into<String>,
        checkpoint: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::ResponseValidation {
            operation: operation.into(),
            checkpoint: checkpoint.into(),
            message: message.into(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, "AUTHENTICATION_FAILED", msg.clone())
            }
            Error::IllegalState(msg) => (StatusCode::CONFLICT, "ILLEGAL_STATE", msg.clone()),
            Error::ResponseValidation { .. } => (
                StatusCode::BAD_GATEWAY,
                "UNEXPECTED_RESPONSE",
                self.to_string(),
            ),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::AlreadyExists(msg) => (StatusCode::CONFLICT, "ALREADY_EXISTS", msg.clone()),
            Error::Overflow(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "OVERFLOW",
                msg.clone(),
            ),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Error::Database(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                msg.clone(),
            ),
            Error::Http(e) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR", e.to_string()),
            Error::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                msg.clone(),
            ),
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
            Error::Sqlx(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                e.to_string(),
            ),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
