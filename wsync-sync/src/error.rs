//! Error types for wsync-sync.
//!
//! Only run-fatal conditions are errors; per-item failures are reported as
//! [`Outcome::Failed`](crate::Outcome::Failed) values.

use std::path::PathBuf;

use thiserror::Error;

use wsync_auth::AuthError;
use wsync_core::{ContentError, CoreError};
use wsync_remote::RemoteError;

/// The manifest could not be trusted or persisted. Always aborts the run.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("manifest I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// All errors that abort a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("invalid content: {0}")]
    Content(#[from] ContentError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("configuration error: {0}")]
    Config(#[from] CoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sync cancelled")]
    Cancelled,
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn manifest_io(path: impl Into<PathBuf>, source: std::io::Error) -> ManifestError {
    ManifestError::Io {
        path: path.into(),
        source,
    }
}
