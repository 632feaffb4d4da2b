use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use slicer_types::SlicerError;

/// Wire error envelope: `{success:false, errorCode, message}`, with
/// `retryAfterSeconds` present only for rate-limit denials.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    #[serde(rename = "errorCode")]
    pub error_code: String,
    pub message: String,
    #[serde(rename = "retryAfterSeconds", skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

/// Wraps [`SlicerError`] so handlers can `?`-propagate it straight into an
/// axum response via its [`IntoResponse`] impl.
pub struct ApiError(pub SlicerError);

impl From<SlicerError> for ApiError {
    fn from(err: SlicerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let retry_after_seconds = match &self.0 {
            SlicerError::RateLimitExceeded {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
            _ => None,
        };

        // Internal failures never leak their cause to the client, per the
        // propagation policy; everything else surfaces its own message.
        let message = if self.0.is_client_error() {
            self.0.to_string()
        } else {
            "an internal error occurred".to_string()
        };

        let body = ErrorResponse {
            success: false,
            error_code: self.0.error_code().to_string(),
            message,
            retry_after_seconds,
        };

        (status, Json(body)).into_response()
    }
}
