//! Authentication and authorization logic.
//!
//! Password hashing, the credential store queries, portal sessions and the
//! access token broker. Everything here talks to the SQLite pool directly;
//! the HTTP layer only converts the outcomes.

pub mod access_tokens;
pub mod password;
pub mod queries;
pub mod sessions;

use std::future::Future;
use std::time::Duration;

use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of generated opaque tokens (alphanumeric, ~380 bits).
const TOKEN_LEN: usize = 64;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad credentials. Unknown user and wrong password look the same.
    #[error("Invalid credentials")]
    CredentialError,

    /// Portal session expired, unknown or inactive.
    #[error("Session invalid")]
    SessionInvalid,

    /// Access token expired, unknown, for another app, or already consumed.
    #[error("Token invalid")]
    TokenInvalid,

    /// The portal session that issued a token is no longer valid.
    #[error("Owning session invalid")]
    OwningSessionInvalid,

    /// Valid identity without permission for the application.
    #[error("Permission denied")]
    PermissionDenied,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    /// A validation call exceeded its time budget.
    #[error("Storage timed out")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Whether the error means "the backing store could not answer".
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AuthError::StorageUnavailable(_) | AuthError::Timeout)
    }
}

/// Generate a random opaque token (64 alphanumeric chars).
pub fn generate_token() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// SHA-256 hash a token for storage.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Run a store call under a time budget. Exceeding it yields
/// [`AuthError::Timeout`], which callers treat as a failed validation.
pub async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, AuthError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| AuthError::Timeout)?
}
