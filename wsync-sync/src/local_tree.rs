//! LocalTree: the sync root on disk plus its manifest.
//!
//! One artifact per file. The walk skips dot-directories (the `.wsync`
//! state directory included), `node_modules`, the settings file and any file
//! whose kind cannot be inferred. Files that look like artifacts but cannot
//! be read are reported in [`LocalListing::invalid`], never dropped: a
//! silently missing file would plan as a local deletion.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use walkdir::{DirEntry, WalkDir};

use wsync_core::digest::{digest_prefix, digest_tree};
use wsync_core::settings::SETTINGS_FILE;
use wsync_core::{
    Artifact, ArtifactKind, ArtifactMetadata, ArtifactPath, ContentError, Fingerprint,
    ManifestEntry, RemoteVersion, SyncSettings,
};

use crate::error::{io_err, ManifestError, SyncError};
use crate::manifest::{self, ManifestFile, STATE_DIR};

/// A local artifact with its fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalArtifact {
    pub artifact: Artifact,
    pub digest: Fingerprint,
}

/// Result of walking the sync root.
#[derive(Debug, Default)]
pub struct LocalListing {
    pub artifacts: BTreeMap<ArtifactPath, LocalArtifact>,
    /// Artifact files that could not be read, decoded or parsed.
    pub invalid: BTreeMap<ArtifactPath, ContentError>,
    /// Secret variables held back by `skip_secrets`.
    pub withheld: BTreeSet<ArtifactPath>,
}

impl LocalListing {
    pub fn digests(&self) -> impl Iterator<Item = (&ArtifactPath, &Fingerprint)> {
        self.artifacts.iter().map(|(path, local)| (path, &local.digest))
    }
}

pub struct LocalTree {
    root: PathBuf,
    settings: SyncSettings,
    manifest_path: PathBuf,
    manifest: Mutex<ManifestFile>,
}

impl LocalTree {
    /// Open `root` for syncing with `workspace`, loading its manifest.
    pub fn open(
        root: impl Into<PathBuf>,
        workspace: &str,
        settings: SyncSettings,
    ) -> Result<Self, ManifestError> {
        let root = root.into();
        let manifest_path = manifest::manifest_path(&root, workspace);
        let manifest = manifest::load(&manifest_path)?;
        tracing::debug!(
            "opened {} with {} manifest entries",
            root.display(),
            manifest.entries.len()
        );
        Ok(Self {
            root,
            settings,
            manifest_path,
            manifest: Mutex::new(manifest),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    // -----------------------------------------------------------------------
    // 1. Listing
    // -----------------------------------------------------------------------

    /// Enumerate every artifact under the root, with digests.
    pub fn list(&self) -> Result<LocalListing, SyncError> {
        std::fs::metadata(&self.root).map_err(|e| io_err(&self.root, e))?;

        let mut listing = LocalListing::default();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_skipped_dir(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let rel = err.path().and_then(|p| relative_path(&self.root, p));
                    match rel {
                        Some(rel) => {
                            listing.invalid.insert(
                                rel.clone(),
                                ContentError::Unreadable {
                                    path: rel.0,
                                    message: err.to_string(),
                                },
                            );
                            continue;
                        }
                        None => return Err(io_err(&self.root, err.into())),
                    }
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.depth() == 1 && entry.file_name() == SETTINGS_FILE {
                continue;
            }
            let Some(rel) = relative_path(&self.root, entry.path()) else {
                tracing::warn!("skipping non UTF-8 path {}", entry.path().display());
                continue;
            };
            let Some(kind) = ArtifactKind::infer(&rel) else {
                continue;
            };
            if !self.settings.admits(&rel, kind) {
                tracing::debug!("filtered by settings: {rel}");
                continue;
            }

            match self.load_file(entry.path(), rel.clone()) {
                Ok(local) => {
                    if self.settings.skip_secrets && is_secret(&local.artifact.metadata) {
                        tracing::debug!("withholding secret variable {rel}");
                        listing.withheld.insert(rel);
                    } else {
                        listing.artifacts.insert(rel, local);
                    }
                }
                Err(err) => {
                    tracing::warn!("{err}");
                    listing.invalid.insert(rel, err);
                }
            }
        }
        tracing::debug!(
            "listed {} local artifacts ({} invalid)",
            listing.artifacts.len(),
            listing.invalid.len()
        );
        Ok(listing)
    }

    /// Fingerprint of the whole tree, or of the paths under `prefix`.
    pub fn tree_digest(&self, prefix: Option<&str>) -> Result<Fingerprint, SyncError> {
        let listing = self.list()?;
        Ok(match prefix {
            Some(prefix) => digest_prefix(listing.digests(), prefix),
            None => digest_tree(listing.digests()),
        })
    }

    // -----------------------------------------------------------------------
    // 2. Single artifacts
    // -----------------------------------------------------------------------

    /// Read one artifact. `None` if the file does not exist.
    pub fn read_artifact(&self, path: &ArtifactPath) -> Result<Option<LocalArtifact>, SyncError> {
        let file = self.file_path(path)?;
        if !file.exists() {
            return Ok(None);
        }
        Ok(Some(self.load_file(&file, path.clone())?))
    }

    /// Write `artifact` to its file: `.wsync.tmp` sibling, then rename.
    pub fn write_artifact(&self, artifact: &Artifact) -> Result<(), SyncError> {
        let target = self.file_path(&artifact.path)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let tmp = PathBuf::from(format!("{}.wsync.tmp", target.display()));
        std::fs::write(&tmp, artifact.content.as_bytes()).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &target) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&target, e));
        }
        tracing::info!("wrote {}", artifact.path);
        Ok(())
    }

    /// Delete an artifact's file and any directories it leaves empty.
    pub fn delete_artifact(&self, path: &ArtifactPath) -> Result<(), SyncError> {
        let target = self.file_path(path)?;
        match std::fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&target, e)),
        }
        let mut dir = target.parent();
        while let Some(current) = dir {
            if current == self.root || std::fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
        tracing::info!("deleted {path}");
        Ok(())
    }

    fn load_file(&self, file: &Path, path: ArtifactPath) -> Result<LocalArtifact, ContentError> {
        let bytes = std::fs::read(file).map_err(|e| ContentError::Unreadable {
            path: path.0.clone(),
            message: e.to_string(),
        })?;
        let artifact = Artifact::from_bytes(path, bytes)?;
        let digest = artifact.digest()?;
        Ok(LocalArtifact { artifact, digest })
    }

    /// Absolute file path for `path`, refusing anything that escapes the root.
    fn file_path(&self, path: &ArtifactPath) -> Result<PathBuf, ContentError> {
        let valid = !path.as_str().is_empty()
            && path.as_str().split('/').all(|part| {
                !part.is_empty() && part != "." && part != ".." && !part.contains('\\')
            })
            && !path.as_str().split('/').next().is_some_and(|top| top == STATE_DIR);
        if !valid {
            return Err(ContentError::InvalidPath {
                path: path.0.clone(),
            });
        }
        Ok(path
            .as_str()
            .split('/')
            .fold(self.root.clone(), |acc, part| acc.join(part)))
    }

    // -----------------------------------------------------------------------
    // 3. Manifest
    // -----------------------------------------------------------------------

    /// Snapshot of the manifest entries.
    pub fn manifest(&self) -> BTreeMap<ArtifactPath, ManifestEntry> {
        self.lock().entries.clone()
    }

    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.lock().synced_at
    }

    /// Record a completed sync of `path` and persist before returning.
    ///
    /// If the write fails the in-memory manifest is left as it was.
    pub fn record_sync(
        &self,
        path: &ArtifactPath,
        digest: Fingerprint,
        remote_version: RemoteVersion,
    ) -> Result<(), ManifestError> {
        let mut manifest = self.lock();
        let previous = manifest.entries.insert(
            path.clone(),
            ManifestEntry {
                digest,
                remote_version,
            },
        );
        let previous_synced_at = manifest.synced_at.replace(Utc::now());
        if let Err(err) = manifest::save(&self.manifest_path, &manifest) {
            match previous {
                Some(entry) => manifest.entries.insert(path.clone(), entry),
                None => manifest.entries.remove(path),
            };
            manifest.synced_at = previous_synced_at;
            return Err(err);
        }
        tracing::debug!("manifest: recorded {path}");
        Ok(())
    }

    /// Drop the manifest entry for `path` and persist before returning.
    pub fn remove_manifest_entry(&self, path: &ArtifactPath) -> Result<(), ManifestError> {
        let mut manifest = self.lock();
        let Some(previous) = manifest.entries.remove(path) else {
            return Ok(());
        };
        if let Err(err) = manifest::save(&self.manifest_path, &manifest) {
            manifest.entries.insert(path.clone(), previous);
            return Err(err);
        }
        tracing::debug!("manifest: removed {path}");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ManifestFile> {
        self.manifest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "node_modules"
}

pub(crate) fn is_secret(metadata: &ArtifactMetadata) -> bool {
    matches!(metadata, ArtifactMetadata::Variable { is_secret: true })
}

/// `/`-joined path of `file` relative to `root`; `None` if not UTF-8.
fn relative_path(root: &Path, file: &Path) -> Option<ArtifactPath> {
    let rel = file.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(ArtifactPath(parts.join("/")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
