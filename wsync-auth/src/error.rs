//! Error types for wsync-auth.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Authentication failures.
///
/// `Clone` so that every caller waiting on one interactive login receives
/// the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No usable credential and interactive login was not allowed.
    #[error("not authenticated; run `wsync login` or set WSYNC_TOKEN")]
    Unauthenticated,

    #[error("login was not approved within {0:?}")]
    LoginTimeout(Duration),

    #[error("login request was denied")]
    LoginDenied,

    #[error("login cancelled")]
    Cancelled,

    /// Transport failure or 5xx from the login endpoints. Retryable.
    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected login response: {0}")]
    Protocol(String),

    #[error("credential store error at {path}: {message}")]
    Store { path: PathBuf, message: String },
}

impl AuthError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Network(_))
    }
}

pub(crate) fn store_err(path: impl Into<PathBuf>, source: impl std::fmt::Display) -> AuthError {
    AuthError::Store {
        path: path.into(),
        message: source.to_string(),
    }
}
