//! Error types for wsync-remote.

use thiserror::Error;
use wsync_core::RemoteVersion;

/// Failures of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The remote version moved since it was listed.
    #[error("version conflict on {path}: expected {}, found {}", show(.expected), show(.found))]
    VersionConflict {
        path: String,
        expected: Option<RemoteVersion>,
        found: Option<RemoteVersion>,
    },

    #[error("credential rejected by remote (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("{path} not found on remote")]
    NotFound { path: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("remote server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("request rejected (HTTP {status}): {message}")]
    Client { status: u16, message: String },

    #[error("invalid response from remote: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Transport failures and 5xx responses.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Network(_) | RemoteError::Server { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RemoteError::Unauthorized { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, RemoteError::VersionConflict { .. })
    }
}

fn show(version: &Option<RemoteVersion>) -> String {
    match version {
        Some(v) => v.to_string(),
        None => "none".to_string(),
    }
}
