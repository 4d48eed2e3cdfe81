//! API error handling.
//!
//! Every failure leaves the service as a JSON body `{ code, message, details? }`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::Error;
use crate::pipeline::CombineError;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "TOO_LONG", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<CombineError> for ApiError {
    fn from(err: CombineError) -> Self {
        tracing::error!(error = %err, "Combine failed");
        let code = match &err {
            CombineError::TimedOut(_) => "COMBINE_TIMEOUT",
            CombineError::Cancelled => "COMBINE_CANCELLED",
            CombineError::SourceStream { .. } => "SOURCE_FAILED",
            _ => "COMBINE_FAILED",
        };
        let api = ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            code,
            "Failed to combine video and audio",
        );
        match err {
            CombineError::ProcessFailed { exit, .. } => api.with_details(serde_json::json!({
                "exitCode": exit.code,
                "signal": exit.signal,
            })),
            _ => api,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound { entity_type, id } => {
                ApiError::not_found(format!("{} '{}' not found", entity_type, id))
            }
            Error::MissingParameter(name) => ApiError::bad_request(
                "MISSING_PARAMETER",
                format!("Missing required parameter: {}", name),
            ),
            Error::UnsupportedQuality(quality) => ApiError::bad_request(
                "UNSUPPORTED_QUALITY",
                format!("Quality '{}' is not supported", quality),
            ),
            Error::UnsupportedBitrate(bitrate) => ApiError::bad_request(
                "UNSUPPORTED_BITRATE",
                format!("Bitrate '{}' is not supported", bitrate),
            ),
            Error::TooLong {
                duration_secs,
                limit_secs,
            } => ApiError::payload_too_large(format!(
                "Video is {}s long; the limit is {}s",
                duration_secs, limit_secs
            ))
            .with_details(serde_json::json!({
                "durationSeconds": duration_secs,
                "limitSeconds": limit_secs,
            })),
            Error::Combine(e) => e.into(),
            _ => {
                tracing::error!("Unexpected error: {}", err);
                ApiError::internal("An unexpected error occurred")
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
