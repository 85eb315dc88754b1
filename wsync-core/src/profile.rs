//! Workspace profiles: which remote and workspace a directory syncs with.
//!
//! # Storage layout
//!
//! ```text
//! ~/.wsync/
//!   active                  (name of the active profile)
//!   workspaces/
//!     <name>.yaml           (one file per profile, mode 0600)
//!   credentials/            (owned by wsync-auth)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A named pointer at a remote workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceProfile {
    pub name: String,
    /// Base URL of the remote service, without trailing slash.
    pub remote: String,
    pub workspace_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.wsync/`: pure, no I/O.
pub fn wsync_root(home: &Path) -> PathBuf {
    home.join(".wsync")
}

/// `<home>/.wsync/workspaces/<name>.yaml`: pure, no I/O.
pub fn profile_path_at(home: &Path, name: &str) -> PathBuf {
    wsync_root(home)
        .join("workspaces")
        .join(format!("{name}.yaml"))
}

fn active_path_at(home: &Path) -> PathBuf {
    wsync_root(home).join("active")
}

/// `<home>/.wsync/workspaces/`, created with mode `0700` if absent.
pub fn profiles_dir_at(home: &Path) -> Result<PathBuf, CoreError> {
    let dir = wsync_root(home).join("workspaces");
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&wsync_root(home))?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load a single profile.
///
/// Returns `CoreError::ProfileNotFound` if absent, `CoreError::Parse` if malformed.
pub fn load_at(home: &Path, name: &str) -> Result<WorkspaceProfile, CoreError> {
    validate_name(name)?;
    let path = profile_path_at(home, name);
    if !path.exists() {
        return Err(CoreError::ProfileNotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load(name: &str) -> Result<WorkspaceProfile, CoreError> {
    load_at(&home()?, name)
}

/// All profiles, sorted by name.
pub fn list_at(home: &Path) -> Result<Vec<WorkspaceProfile>, CoreError> {
    let dir = wsync_root(home).join("workspaces");
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut entries: Vec<_> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut profiles = Vec::new();
    for entry in entries {
        let fname = entry.file_name();
        if !fname.to_string_lossy().ends_with(".yaml") {
            continue;
        }
        let contents = std::fs::read_to_string(entry.path())?;
        let profile: WorkspaceProfile = serde_yaml::from_str(&contents).map_err(|e| {
            CoreError::Parse {
                path: entry.path(),
                source: e,
            }
        })?;
        profiles.push(profile);
    }
    Ok(profiles)
}

/// `list_at` convenience wrapper.
pub fn list() -> Result<Vec<WorkspaceProfile>, CoreError> {
    list_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save a profile.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, profile: &WorkspaceProfile) -> Result<(), CoreError> {
    validate_name(&profile.name)?;
    profiles_dir_at(home)?;
    let path = profile_path_at(home, &profile.name);
    let tmp_path = path.with_file_name(format!("{}.yaml.tmp", profile.name));

    let yaml = serde_yaml::to_string(profile)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// 4. Add / remove
// ---------------------------------------------------------------------------

/// Create or update the profile `name`.
///
/// Updating keeps `created_at`. The first profile ever added becomes active.
pub fn add_at(
    home: &Path,
    name: &str,
    remote: &str,
    workspace_id: &str,
) -> Result<WorkspaceProfile, CoreError> {
    validate_name(name)?;
    let now = Utc::now();
    let created_at = match load_at(home, name) {
        Ok(existing) => existing.created_at,
        Err(CoreError::ProfileNotFound { .. }) => now,
        Err(err) => return Err(err),
    };

    let profile = WorkspaceProfile {
        name: name.to_string(),
        remote: normalize_remote(remote),
        workspace_id: workspace_id.to_string(),
        created_at,
        updated_at: now,
    };
    save_at(home, &profile)?;

    if active_at(home)?.is_none() {
        set_active_at(home, name)?;
    }
    Ok(profile)
}

/// `add_at` convenience wrapper.
pub fn add(name: &str, remote: &str, workspace_id: &str) -> Result<WorkspaceProfile, CoreError> {
    add_at(&home()?, name, remote, workspace_id)
}

/// Delete a profile. Returns `false` if it did not exist.
///
/// Clears the active marker when it pointed at the removed profile.
pub fn remove_at(home: &Path, name: &str) -> Result<bool, CoreError> {
    validate_name(name)?;
    let path = profile_path_at(home, name);
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_file(&path)?;
    if active_at(home)?.as_deref() == Some(name) {
        std::fs::remove_file(active_path_at(home))?;
    }
    Ok(true)
}

/// `remove_at` convenience wrapper.
pub fn remove(name: &str) -> Result<bool, CoreError> {
    remove_at(&home()?, name)
}

// ---------------------------------------------------------------------------
// 5. Active profile
// ---------------------------------------------------------------------------

/// Mark `name` as the active profile. The profile must exist.
pub fn set_active_at(home: &Path, name: &str) -> Result<(), CoreError> {
    load_at(home, name)?;
    let path = active_path_at(home);
    let tmp = path.with_file_name("active.tmp");
    std::fs::write(&tmp, format!("{name}\n"))?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// `set_active_at` convenience wrapper.
pub fn set_active(name: &str) -> Result<(), CoreError> {
    set_active_at(&home()?, name)
}

/// Name of the active profile, if one is set.
pub fn active_at(home: &Path) -> Result<Option<String>, CoreError> {
    let path = active_path_at(home);
    if !path.exists() {
        return Ok(None);
    }
    let name = std::fs::read_to_string(&path)?.trim().to_string();
    Ok((!name.is_empty()).then_some(name))
}

/// `active_at` convenience wrapper.
pub fn active() -> Result<Option<String>, CoreError> {
    active_at(&home()?)
}

/// Load `explicit` if given, otherwise the active profile.
pub fn resolve_at(home: &Path, explicit: Option<&str>) -> Result<WorkspaceProfile, CoreError> {
    match explicit {
        Some(name) => load_at(home, name),
        None => {
            let name = active_at(home)?.ok_or(CoreError::NoActiveProfile)?;
            load_at(home, &name)
        }
    }
}

/// `resolve_at` convenience wrapper.
pub fn resolve(explicit: Option<&str>) -> Result<WorkspaceProfile, CoreError> {
    resolve_at(&home()?, explicit)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// `dirs::home_dir()` or `CoreError::HomeNotFound`.
pub fn home() -> Result<PathBuf, CoreError> {
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}

fn validate_name(name: &str) -> Result<(), CoreError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidProfileName(name.to_string()))
    }
}

fn normalize_remote(remote: &str) -> String {
    remote.trim().trim_end_matches('/').to_string()
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_home() -> TempDir {
        TempDir::new().expect("tempdir")
    }

    #[test]
    fn profile_path_is_correct() {
        let home = make_home();
        let path = profile_path_at(home.path(), "prod");
        assert!(path.ends_with(".wsync/workspaces/prod.yaml"));
    }

    #[test]
    fn first_profile_becomes_active() {
        let home = make_home();
        add_at(home.path(), "prod", "https://wm.example.com/", "main").expect("add");
        add_at(home.path(), "staging", "https://staging.example.com", "main").expect("add");
        assert_eq!(active_at(home.path()).unwrap().as_deref(), Some("prod"));
    }

    #[test]
    fn remote_trailing_slash_is_trimmed() {
        let home = make_home();
        let p = add_at(home.path(), "prod", "https://wm.example.com/", "main").expect("add");
        assert_eq!(p.remote, "https://wm.example.com");
    }

    #[test]
    fn re_adding_keeps_created_at() {
        let home = make_home();
        let first = add_at(home.path(), "prod", "https://a", "main").expect("add");
        let second = add_at(home.path(), "prod", "https://b", "other").expect("re-add");
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.remote, "https://b");
        assert_eq!(load_at(home.path(), "prod").unwrap().workspace_id, "other");
    }

    #[test]
    fn remove_clears_active_marker() {
        let home = make_home();
        add_at(home.path(), "prod", "https://a", "main").expect("add");
        assert!(remove_at(home.path(), "prod").expect("remove"));
        assert!(active_at(home.path()).unwrap().is_none());
        assert!(!remove_at(home.path(), "prod").expect("remove again"));
    }

    #[test]
    fn set_active_requires_existing_profile() {
        let home = make_home();
        let err = set_active_at(home.path(), "ghost").unwrap_err();
        assert!(matches!(err, CoreError::ProfileNotFound { .. }));
    }

    #[test]
    fn resolve_without_active_profile_errors() {
        let home = make_home();
        let err = resolve_at(home.path(), None).unwrap_err();
        assert!(matches!(err, CoreError::NoActiveProfile));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let home = make_home();
        for bad in ["", "../etc", "a/b", ".hidden"] {
            let err = add_at(home.path(), bad, "https://a", "main").unwrap_err();
            assert!(matches!(err, CoreError::InvalidProfileName(_)), "{bad}");
        }
    }

    #[test]
    fn save_cleans_up_tmp() {
        let home = make_home();
        add_at(home.path(), "prod", "https://a", "main").expect("add");
        let tmp = profile_path_at(home.path(), "prod").with_file_name("prod.yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    #[cfg(unix)]
    fn profile_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let home = make_home();
        add_at(home.path(), "prod", "https://a", "main").expect("add");
        let mode = std::fs::metadata(profile_path_at(home.path(), "prod"))
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
    }
}
