//! Error handling for the plate gate server

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
    /// Not found (unknown camera, inactive camera, unknown door)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Frame capture error (ffmpeg spawn/read failure)
    #[error("Capture error: {0}")]
    Capture(String),

    /// Detector / OCR capability error
    #[error("Capability error: {0}")]
    Capability(String),

    /// Door actuator error
    #[error("Actuator error: {0}")]
    Actuator(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encode/decode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// SQLx database error
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Error::Capture(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CAPTURE_ERROR",
                msg.clone(),
            ),
            Error::Capability(msg) => (
                StatusCode::BAD_GATEWAY,
                "CAPABILITY_ERROR",
                msg.clone(),
            ),
            Error::Actuator(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ACTUATOR_ERROR",
                msg.clone(),
            ),
            Error::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERIALIZATION_ERROR",
                e.to_string(),
            ),
            Error::Http(e) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR", e.to_string()),
            Error::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                e.to_string(),
            ),
            Error::Image(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IMAGE_ERROR",
                e.to_string(),
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
