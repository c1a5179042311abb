use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error types with appropriate HTTP status codes.
///
/// These cover failures that happen *outside* an active mediation pipeline
/// (startup, configuration, requests that never activate the REST layer).
/// Once a pipeline is running, every fatal condition is turned into an abort
/// envelope instead; see [`crate::pipeline`].
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Error response body for requests that bypass the envelope.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full error details server-side for debugging
        // but only expose sanitized messages to clients
        tracing::error!(error = %self, "Request failed");

        let (status, error_type, message) = match &self {
            AppError::ConfigError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                "Service configuration error. Please contact support.",
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.as_str()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.as_str()),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: message.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_keeps_message() {
        let response = AppError::NotFound("Unsupported extension: yaml".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_config_error_hides_details() {
        let response = AppError::ConfigError("RATE_LIMIT_CLASSES is broken".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("config_error"));
        assert!(!body.contains("RATE_LIMIT_CLASSES"));
    }

    #[test]
    fn test_config_error_display() {
        let err = AppError::ConfigError("REST_AUTH_KEYWORD must not be empty".to_string());
        assert!(err.to_string().contains("REST_AUTH_KEYWORD"));
    }
}
