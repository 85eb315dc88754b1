//! wsync core library: artifact model, content digests, profiles, errors.
//!
//! - [`types`]: newtypes, artifact kinds and kind-specific metadata
//! - [`digest`]: fingerprints for single artifacts and whole trees
//! - [`profile`]: workspace profiles under `~/.wsync/`
//! - [`settings`]: per-directory `wsync.yaml`
//! - [`cancel`]: [`CancelToken`]

pub mod cancel;
pub mod digest;
pub mod error;
pub mod profile;
pub mod settings;
pub mod types;

pub use cancel::CancelToken;
pub use error::{ContentError, CoreError};
pub use profile::WorkspaceProfile;
pub use settings::SyncSettings;
pub use types::{
    Artifact, ArtifactKind, ArtifactMetadata, ArtifactPath, Credential, Fingerprint,
    ManifestEntry, RemoteVersion, ScriptLanguage,
};
