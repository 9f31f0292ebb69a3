use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Request too large")]
    RequestTooLarge,

    #[error("Malformed multipart body: {0}")]
    Multipart(String),

    #[error("Document rejected: {0}")]
    Rejected(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_code) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg, "VALIDATION_ERROR"),
            ApiError::UnsupportedMediaType(msg) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg, "UNSUPPORTED_MEDIA_TYPE")
            }
            ApiError::RequestTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request payload too large".to_string(),
                "REQUEST_TOO_LARGE",
            ),
            ApiError::Multipart(msg) => {
                warn!("Multipart error: {}", msg);
                (StatusCode::BAD_REQUEST, msg, "MULTIPART_ERROR")
            }
            ApiError::Rejected(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg, "DOCUMENT_REJECTED"),
        };

        let response_body = json!({
            "success": false,
            "error": error_message,
            "error_code": error_code,
            "timestamp": chrono::Utc::now()
        });

        (status, Json(response_body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
