//! Error types for emotabi-server
//!
//! Client errors carry their message; every server-side failure is logged
//! in full and answered with the same generic body.

use crate::fusion::FusionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Generic 500 body
pub const INTERNAL_ERROR_MESSAGE: &str = "サーバー内部エラーが発生しました";
pub const INTERNAL_ERROR_DETAIL: &str =
    "処理中に問題が発生しました。しばらく待ってから再度お試しください。";

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid input (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Request body over the transport limit (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FusionError> for ApiError {
    fn from(err: FusionError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            ApiError::PayloadTooLarge(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({
                    "error": "ファイルサイズが大きすぎます",
                    "message": msg,
                })),
            )
                .into_response(),
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": msg }))).into_response()
            }
            other => {
                error!(error = %other, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": INTERNAL_ERROR_MESSAGE,
                        "message": INTERNAL_ERROR_DETAIL,
                    })),
                )
                    .into_response()
            }
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
