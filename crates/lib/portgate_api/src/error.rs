//! Application error types.
//!
//! Every failure reaching the browser collapses into "show login" (401),
//! "access denied" (403), a validation message, or an unavailable store.
//! Internal detail is logged, never returned.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use portgate_core::auth::AuthError;
use thiserror::Error;
use tracing::warn;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Service unavailable")]
    Unavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    /// The "show login" outcome.
    pub fn login_required() -> Self {
        AppError::Unauthorized("Please log in".into())
    }

    /// Map an authentication failure on a path that gates identity. Store
    /// errors and timeouts deny instead of surfacing as 503.
    pub fn fail_closed(e: AuthError) -> Self {
        if e.is_unavailable() {
            warn!(error = %e, "session check failed closed");
        }
        match AppError::from(e) {
            AppError::Unavailable(_) | AppError::Internal(_) => AppError::login_required(),
            other => other,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::Unavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                "Service temporarily unavailable",
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            ),
        };
        if let AppError::Unavailable(detail) | AppError::Internal(detail) = &self {
            warn!(%status, detail, "request failed");
        }
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::CredentialError => AppError::Unauthorized("Invalid credentials".into()),
            AuthError::SessionInvalid
            | AuthError::TokenInvalid
            | AuthError::OwningSessionInvalid => AppError::login_required(),
            AuthError::PermissionDenied => AppError::Forbidden("Access denied".into()),
            AuthError::ValidationError(msg) => AppError::Validation(msg),
            AuthError::StorageUnavailable(e) => AppError::Unavailable(e.to_string()),
            AuthError::Timeout => AppError::Unavailable("store timed out".into()),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}
