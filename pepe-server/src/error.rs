//! API error handling module
//!
//! Provides a unified error type for all API endpoints with structured error variants.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pepe_core::{ErrorKind, PepeError};
use thiserror::Error;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request - client provided invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Not found - unknown relay ticket or route
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unsupported media type - token request with an unknown Content-Type
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Internal server error - unexpected server-side failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable - feature disabled in this deployment
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Core protocol error
    #[error("Protocol error: {0}")]
    Pepe(#[from] PepeError),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create an internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a service unavailable error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Pepe(e) => match e.kind() {
                // Upstream failures → 502
                ErrorKind::Network | ErrorKind::ChallengeTrigger => StatusCode::BAD_GATEWAY,

                // Malformed protocol messages → 400
                ErrorKind::ChallengeParse
                | ErrorKind::KeyDecode
                | ErrorKind::UnsupportedTokenType
                | ErrorKind::MissingExtension
                | ErrorKind::Finalize => StatusCode::BAD_REQUEST,
            },
        }
    }

    /// Get the error code for programmatic error handling
    fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Pepe(e) => match e.kind() {
                ErrorKind::ChallengeParse => "INVALID_MESSAGE",
                ErrorKind::KeyDecode => "INVALID_KEY",
                ErrorKind::UnsupportedTokenType => "UNSUPPORTED_TOKEN_TYPE",
                ErrorKind::MissingExtension => "MISSING_EXTENSIONS",
                ErrorKind::Finalize => "FINALIZE_ERROR",
                ErrorKind::Network => "UPSTREAM_ERROR",
                ErrorKind::ChallengeTrigger => "CHALLENGE_TRIGGER_FAILED",
            },
        }
    }

    /// Get sanitized error message for client response
    fn client_message(&self) -> String {
        match self {
            // Upstream details stay in the logs
            Self::Pepe(e) if e.kind() == ErrorKind::Network => "Upstream request failed".into(),
            Self::Pepe(e) => e.to_string(),
            _ => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::UnsupportedMediaType(_) => "unsupported_media_type",
            Self::Internal(_) => "internal",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Pepe(_) => "protocol",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        // Log based on severity, always including internal details
        if status.is_server_error() {
            tracing::error!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Server error"
            );
        } else {
            tracing::warn!(
                status = %status,
                category = category,
                code = code,
                error = %internal_message,
                "Client error"
            );
        }

        let body = serde_json::json!({
            "error": client_message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}
