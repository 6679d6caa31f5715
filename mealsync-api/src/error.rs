//! Error Types for the KV Proxy
//!
//! Every failure leaves the proxy as a JSON body of the form
//! `{"error": "...", "details": "...", "code": "..."}` with the status code
//! its [`ErrorCode`] maps to. Clients only rely on `error` and the status;
//! `code` is for logs and dashboards.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mealsync_core::RecordError;
use mealsync_storage::BlobError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for proxy responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Request Errors (400, 405, 413)
    // ========================================================================
    /// Malformed userId/key, bad query string or invalid JSON body
    InvalidInput,

    /// A required query parameter or body field is absent
    MissingField,

    MethodNotAllowed,

    /// Body or value exceeds the configured payload limit
    PayloadTooLarge,

    // ========================================================================
    // Not Found (404)
    // ========================================================================
    KeyNotFound,

    // ========================================================================
    // Server Errors (500, 507)
    // ========================================================================
    InternalError,

    /// Blob store quota is exhausted
    InsufficientStorage,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidInput | ErrorCode::MissingField => StatusCode::BAD_REQUEST,
            ErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::KeyNotFound => StatusCode::NOT_FOUND,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "Invalid request",
            ErrorCode::MissingField => "Missing required field",
            ErrorCode::MethodNotAllowed => "Method not allowed",
            ErrorCode::PayloadTooLarge => "Payload too large",
            ErrorCode::KeyNotFound => "Key not found",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::InsufficientStorage => "Storage quota exceeded",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    /// Human-readable message, sent as `error`.
    #[serde(rename = "error")]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    pub code: ErrorCode,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
            code,
        }
    }

    /// Create an error using the code's default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors
    // ========================================================================

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Missing required field: {}", field),
        )
    }

    pub fn method_not_allowed() -> Self {
        Self::from_code(ErrorCode::MethodNotAllowed)
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::from_code(ErrorCode::PayloadTooLarge)
            .with_details(format!("Value exceeds the {} byte limit", limit))
    }

    pub fn key_not_found() -> Self {
        Self::from_code(ErrorCode::KeyNotFound)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn insufficient_storage(details: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::InsufficientStorage).with_details(details)
    }
}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<RecordError> for ApiError {
    fn from(err: RecordError) -> Self {
        ApiError::invalid_input("Invalid pathname").with_details(err.to_string())
    }
}

impl From<BlobError> for ApiError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::InvalidPath(path) => {
                ApiError::invalid_input("Invalid pathname").with_details(path)
            }
            BlobError::QuotaExceeded { used, limit } => ApiError::insufficient_storage(format!(
                "{} of {} bytes in use",
                used, limit
            )),
            BlobError::Backend(message) => {
                // Backend detail stays in the logs
                tracing::error!(error = %message, "Blob store error");
                ApiError::internal_error("Failed to access storage")
            }
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_input("Invalid JSON").with_details(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
