//! On-disk credential storage, one JSON file per profile.
//!
//! ```text
//! ~/.wsync/credentials/<profile>.json   (mode 0600, dir 0700)
//! ```

use std::path::{Path, PathBuf};

use wsync_core::profile::wsync_root;
use wsync_core::Credential;

use crate::error::{store_err, AuthError};

#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store for `profile` under `<home>/.wsync/credentials/`.
    pub fn at(home: &Path, profile: &str) -> Self {
        Self {
            path: wsync_root(home)
                .join("credentials")
                .join(format!("{profile}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored credential, or `None` if nothing has been saved.
    pub fn load(&self) -> Result<Option<Credential>, AuthError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(store_err(&self.path, e)),
        };
        let credential = serde_json::from_str(&contents).map_err(|e| store_err(&self.path, e))?;
        Ok(Some(credential))
    }

    /// Write flow: `.json.tmp` sibling → `chmod 0600` → `rename`.
    pub fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| store_err(&self.path, "credential path has no parent"))?;
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| store_err(dir, e))?;
            set_permissions(dir, 0o700)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(credential).map_err(|e| store_err(&self.path, e))?;
        std::fs::write(&tmp, json).map_err(|e| store_err(&tmp, e))?;
        set_permissions(&tmp, 0o600)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(store_err(&self.path, e));
        }
        Ok(())
    }

    /// Remove the stored credential. Missing file is not an error.
    pub fn clear(&self) -> Result<(), AuthError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(store_err(&self.path, e)),
        }
    }
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<(), AuthError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| store_err(path, e))
}
#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<(), AuthError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    #[test]
    fn load_without_file_is_none() {
        let home = TempDir::new().unwrap();
        let store = FileCredentialStore::at(home.path(), "prod");
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn save_then_load_returns_same_credential() {
        let home = TempDir::new().unwrap();
        let store = FileCredentialStore::at(home.path(), "prod");
        let expires = Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap();
        let cred = Credential::new("tok-123", Some(expires));
        store.save(&cred).unwrap();
        assert_eq!(store.load().unwrap(), Some(cred));
        assert!(store.path().ends_with(".wsync/credentials/prod.json"));
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let home = TempDir::new().unwrap();
        let store = FileCredentialStore::at(home.path(), "prod");
        store.save(&Credential::new("tok", None)).unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn clear_is_idempotent() {
        let home = TempDir::new().unwrap();
        let store = FileCredentialStore::at(home.path(), "prod");
        store.save(&Credential::new("tok", None)).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_a_store_error() {
        let home = TempDir::new().unwrap();
        let store = FileCredentialStore::at(home.path(), "prod");
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(matches!(store.load(), Err(AuthError::Store { .. })));
    }
}
