//! Manifest: the last successful sync of every path.
//!
//! Persists a `ManifestFile` JSON document at
//! `<root>/.wsync/<workspace>.manifest.json`.
//!
//! ```json
//! { "version": 1,
//!   "synced_at": "2026-01-01T00:00:00Z",
//!   "entries": { "f/a.ts": { "digest": "…", "remote_version": "…" } } }
//! ```
//!
//! Unknown fields are ignored on read. Writes go to a `.tmp` sibling, are
//! flushed to disk, then renamed over the original.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wsync_core::{ArtifactPath, ManifestEntry};

use crate::error::{manifest_io, ManifestError};

/// Directory under the sync root that holds wsync state.
pub const STATE_DIR: &str = ".wsync";

pub const FORMAT_VERSION: u32 = 1;

/// On-disk manifest payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    #[serde(default = "format_version")]
    pub version: u32,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entries: BTreeMap<ArtifactPath, ManifestEntry>,
}

impl Default for ManifestFile {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            synced_at: None,
            entries: BTreeMap::new(),
        }
    }
}

fn format_version() -> u32 {
    FORMAT_VERSION
}

/// `<root>/.wsync/<workspace>.manifest.json`
pub fn manifest_path(root: &Path, workspace: &str) -> PathBuf {
    root.join(STATE_DIR)
        .join(format!("{workspace}.manifest.json"))
}

/// Load the manifest at `path`. A missing file is an empty manifest; an
/// unparseable one is [`ManifestError::Corrupt`].
pub fn load(path: &Path) -> Result<ManifestFile, ManifestError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ManifestFile::default()),
        Err(e) => return Err(manifest_io(path, e)),
    };
    serde_json::from_str(&contents).map_err(|e| ManifestError::Corrupt {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Save `manifest` to `path` atomically.
pub fn save(path: &Path, manifest: &ManifestFile) -> Result<(), ManifestError> {
    let Some(dir) = path.parent() else {
        return Err(manifest_io(
            path,
            std::io::Error::other("invalid manifest path"),
        ));
    };
    std::fs::create_dir_all(dir).map_err(|e| manifest_io(dir, e))?;

    let json = serde_json::to_string_pretty(manifest)
        .map_err(|e| manifest_io(path, std::io::Error::other(e)))?;
    let tmp = path.with_extension("json.tmp");
    let written = std::fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(json.as_bytes())?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(manifest_io(&tmp, e));
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(manifest_io(path, e));
    }
    Ok(())
}
