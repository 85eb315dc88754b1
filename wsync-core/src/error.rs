//! Error types for wsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from profile and settings persistence.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file path.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`, so `~/.wsync/` cannot be located.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The profile YAML file did not exist at the expected path.
    #[error("workspace profile not found at {path}")]
    ProfileNotFound { path: PathBuf },

    #[error("no active workspace profile; run `wsync workspace add` first")]
    NoActiveProfile,

    #[error("invalid profile name '{0}': use letters, digits, '-' or '_'")]
    InvalidProfileName(String),
}

/// Local content that cannot be turned into an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("{path}: cannot read: {message}")]
    Unreadable { path: String, message: String },

    #[error("{path}: content is not valid UTF-8")]
    NotUtf8 { path: String },

    #[error("{path}: invalid {format}: {message}")]
    Malformed {
        path: String,
        format: &'static str,
        message: String,
    },

    #[error("{path}: not a valid workspace-relative path")]
    InvalidPath { path: String },

    #[error("{path}: not a recognised artifact type")]
    UnknownKind { path: String },

    #[error("{path}: kind mismatch (expected {expected}, found {found})")]
    KindMismatch {
        path: String,
        expected: String,
        found: String,
    },
}
