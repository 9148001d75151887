//! Centralized API error handling
//!
//! Maps the authentication error taxonomy onto HTTP status codes and JSON
//! error bodies. Credential failures that could reveal why a login or
//! refresh was refused all render the same generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;

/// Message returned for every credential failure that must not leak its cause
pub const GENERIC_AUTH_FAILURE: &str = "authentication failed";

/// API error type with HTTP status code mapping
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Error details in the response
#[derive(Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message safe to show to the client
    fn public_message(&self) -> String {
        match self {
            // Internal details stay in the logs
            ApiError::InternalError(_) => "Internal server error".to_string(),
            ApiError::DatabaseError(_) => "Database error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Log server errors
        match &self {
            ApiError::InternalError(_) | ApiError::DatabaseError(_) => {
                tracing::error!(error = %self, code = %error_code, "Server error occurred");
            }
            _ => {
                tracing::debug!(error = %self, code = %error_code, "Client error occurred");
            }
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code: error_code.to_string(),
                message: self.public_message(),
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidAccountId(_)
            | AuthError::InvalidChainId(_)
            | AuthError::InvalidDomain
            | AuthError::InvalidFormat(_)
            | AuthError::MalformedMessage(_)
            | AuthError::AccountMismatch
            | AuthError::OutsideValidityWindow => ApiError::BadRequest(err.to_string()),
            AuthError::SignatureMismatch => ApiError::Unauthorized("Signature mismatch".to_string()),
            AuthError::NonceInvalid
            | AuthError::SessionNotFoundOrExpired
            | AuthError::ReuseDetected => {
                tracing::debug!(reason = %err, "Credential rejected");
                ApiError::Unauthorized(GENERIC_AUTH_FAILURE.to_string())
            }
            AuthError::Upstream(msg) => ApiError::InternalError(format!("upstream: {}", msg)),
            AuthError::Store(msg) => ApiError::DatabaseError(msg),
            AuthError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}
