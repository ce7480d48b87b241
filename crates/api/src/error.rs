//! API error types and handling

use axum::{
    http::{header::InvalidHeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use patos_shared::AuthError;
use serde_json::json;

use crate::{
    auth::{OAuthError, PasswordValidationError},
    email::EmailError,
};

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Authentication required")]
    Unauthorized,

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("Resource already exists")]
    Conflict(String),

    // Upstream errors
    #[error("Upstream provider failed")]
    BadGateway,

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error")]
    Internal,
    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Authentication
            ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),

            // Validation
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),

            // Resources
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),

            // Upstream
            ApiError::BadGateway => (StatusCode::BAD_GATEWAY, "BAD_GATEWAY", self.to_string()),

            // Internal
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", "Database error".to_string()),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", self.to_string()),
            ApiError::ServiceUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", self.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            // Expired, malformed and out-of-scope tokens all look the same to the client
            AuthError::InvalidToken | AuthError::Unauthorized => ApiError::Unauthorized,
            AuthError::Conflict(msg) => ApiError::Conflict(msg),
            AuthError::NotFound => ApiError::NotFound,
            AuthError::Fatal(msg) => {
                tracing::error!(error = %msg, "Unrecoverable failure");
                ApiError::Internal
            }
            AuthError::Storage(msg) => {
                tracing::error!(error = %msg, "Storage error");
                ApiError::Database(msg)
            }
        }
    }
}

impl From<OAuthError> for ApiError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::UnknownProvider(_) => ApiError::NotFound,
            OAuthError::UnverifiedEmail => ApiError::Unauthorized,
            other => {
                tracing::warn!(error = %other, "OAuth provider failure");
                ApiError::BadGateway
            }
        }
    }
}

impl From<EmailError> for ApiError {
    fn from(err: EmailError) -> Self {
        tracing::error!(error = %err, "Email delivery failed");
        ApiError::ServiceUnavailable
    }
}

impl From<PasswordValidationError> for ApiError {
    fn from(err: PasswordValidationError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<InvalidHeaderValue> for ApiError {
    fn from(err: InvalidHeaderValue) -> Self {
        tracing::error!(error = %err, "Invalid header value");
        ApiError::Internal
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
