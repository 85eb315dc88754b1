//! The remote workspace contract consumed by the sync engine.

use serde::{Deserialize, Serialize};
use wsync_core::{Artifact, ArtifactKind, ArtifactPath, Credential, Fingerprint, RemoteVersion};

use crate::error::RemoteError;

/// One row of a remote listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub path: ArtifactPath,
    pub kind: ArtifactKind,
    pub digest: Fingerprint,
    pub version: RemoteVersion,
    /// Dependency hints declared by the remote copy.
    #[serde(default)]
    pub dependencies: Vec<ArtifactPath>,
}

/// Fetched content together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteArtifact {
    pub artifact: Artifact,
    pub version: RemoteVersion,
}

/// Typed access to one remote workspace.
///
/// Every mutation carries the version the caller last saw. `push` with
/// `expected = None` only creates; it fails with `VersionConflict` if the
/// path already exists.
pub trait RemoteWorkspace: Send + Sync {
    fn list(&self, credential: &Credential) -> Result<Vec<RemoteEntry>, RemoteError>;

    fn fetch(&self, credential: &Credential, path: &ArtifactPath)
        -> Result<RemoteArtifact, RemoteError>;

    fn push(
        &self,
        credential: &Credential,
        artifact: &Artifact,
        expected: Option<&RemoteVersion>,
    ) -> Result<RemoteVersion, RemoteError>;

    fn delete(
        &self,
        credential: &Credential,
        path: &ArtifactPath,
        expected: &RemoteVersion,
    ) -> Result<(), RemoteError>;
}
