//! Per-directory sync settings read from `<root>/wsync.yaml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{ArtifactKind, ArtifactPath};

pub const SETTINGS_FILE: &str = "wsync.yaml";

/// Options that shape which local files take part in a sync.
///
/// Every field has a default; unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Profile to use instead of the globally active one.
    pub workspace: Option<String>,
    /// Path prefixes (or `prefix*` globs) left out of the sync.
    pub excludes: Vec<String>,
    pub skip_variables: bool,
    pub skip_resources: bool,
    pub skip_secrets: bool,
    pub include_schedules: bool,
    /// Upper bound on concurrently executing items.
    pub workers: usize,
    /// Attempts per item for transient failures.
    pub retry_attempts: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            workspace: None,
            excludes: Vec::new(),
            skip_variables: false,
            skip_resources: false,
            skip_secrets: false,
            include_schedules: true,
            workers: 4,
            retry_attempts: 3,
        }
    }
}

impl SyncSettings {
    /// Whether `path` matches any exclude pattern.
    pub fn is_excluded(&self, path: &ArtifactPath) -> bool {
        self.excludes.iter().any(|pattern| match pattern.strip_suffix('*') {
            Some(prefix) => path.as_str().starts_with(prefix),
            None => path.is_under(pattern),
        })
    }

    /// Whether a path of `kind` takes part in the sync at all.
    ///
    /// Secret filtering needs content and is applied by the local walk.
    pub fn admits(&self, path: &ArtifactPath, kind: ArtifactKind) -> bool {
        let kind_skipped = match kind {
            ArtifactKind::Variable => self.skip_variables,
            ArtifactKind::Resource | ArtifactKind::ResourceType => self.skip_resources,
            ArtifactKind::Schedule => !self.include_schedules,
            _ => false,
        };
        !kind_skipped && !self.is_excluded(path)
    }
}

pub fn settings_path(root: &Path) -> PathBuf {
    root.join(SETTINGS_FILE)
}

/// Load `<root>/wsync.yaml`, or defaults if the file does not exist.
pub fn load_at(root: &Path) -> Result<SyncSettings, CoreError> {
    let path = settings_path(root);
    if !path.exists() {
        return Ok(SyncSettings::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    if contents.trim().is_empty() {
        return Ok(SyncSettings::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse { path, source: e })
}
