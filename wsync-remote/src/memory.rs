//! In-process [`RemoteWorkspace`] with version counters and fault injection.
//!
//! Enforces the same optimistic-concurrency rules as the HTTP service.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use wsync_core::{Artifact, ArtifactPath, Credential, Fingerprint, RemoteVersion};

use crate::client::{RemoteArtifact, RemoteEntry, RemoteWorkspace};
use crate::error::RemoteError;

/// A remote mutation, in the order it was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Push(ArtifactPath),
    Delete(ArtifactPath),
}

#[derive(Debug, Clone)]
struct Stored {
    artifact: Artifact,
    digest: Fingerprint,
    version: RemoteVersion,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ArtifactPath, Stored>,
    next_version: u64,
    faults: HashMap<ArtifactPath, VecDeque<RemoteError>>,
    list_faults: VecDeque<RemoteError>,
    accepted_token: Option<String>,
    mutations: Vec<Mutation>,
}

#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    state: Mutex<State>,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Server-side write that bypasses version checks (another client's edit).
    pub fn insert(&self, artifact: Artifact) -> Result<RemoteVersion, RemoteError> {
        let mut state = self.lock();
        store(&mut state, artifact)
    }

    /// Server-side delete that bypasses version checks.
    pub fn remove(&self, path: &ArtifactPath) -> bool {
        self.lock().objects.remove(path).is_some()
    }

    pub fn get(&self, path: &ArtifactPath) -> Option<Artifact> {
        self.lock().objects.get(path).map(|s| s.artifact.clone())
    }

    pub fn version(&self, path: &ArtifactPath) -> Option<RemoteVersion> {
        self.lock().objects.get(path).map(|s| s.version.clone())
    }

    pub fn paths(&self) -> Vec<ArtifactPath> {
        self.lock().objects.keys().cloned().collect()
    }

    /// Fail the next call touching `path` with `err`. Calls queue up.
    pub fn fail_next(&self, path: &ArtifactPath, err: RemoteError) {
        self.lock()
            .faults
            .entry(path.clone())
            .or_default()
            .push_back(err);
    }

    /// Fail the next `list` call with `err`.
    pub fn fail_next_list(&self, err: RemoteError) {
        self.lock().list_faults.push_back(err);
    }

    /// Reject every credential except `token` with 401.
    pub fn require_token(&self, token: &str) {
        self.lock().accepted_token = Some(token.to_string());
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.lock().mutations.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn store(state: &mut State, artifact: Artifact) -> Result<RemoteVersion, RemoteError> {
    let digest = artifact.digest().map_err(|e| RemoteError::Client {
        status: 422,
        message: e.to_string(),
    })?;
    if let Some(existing) = state.objects.get(&artifact.path) {
        if existing.artifact.kind() != artifact.kind() {
            return Err(RemoteError::Client {
                status: 400,
                message: format!(
                    "{} is a {}; kind cannot change to {}",
                    artifact.path,
                    existing.artifact.kind(),
                    artifact.kind()
                ),
            });
        }
    }
    state.next_version += 1;
    let version = RemoteVersion(format!("v{}", state.next_version));
    state.objects.insert(
        artifact.path.clone(),
        Stored {
            artifact,
            digest,
            version: version.clone(),
        },
    );
    Ok(version)
}

fn check_token(state: &State, credential: &Credential) -> Result<(), RemoteError> {
    match &state.accepted_token {
        Some(token) if *token != credential.token => Err(RemoteError::Unauthorized { status: 401 }),
        _ => Ok(()),
    }
}

fn take_fault(state: &mut State, path: &ArtifactPath) -> Result<(), RemoteError> {
    match state.faults.get_mut(path).and_then(VecDeque::pop_front) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

impl RemoteWorkspace for MemoryWorkspace {
    fn list(&self, credential: &Credential) -> Result<Vec<RemoteEntry>, RemoteError> {
        let mut state = self.lock();
        check_token(&state, credential)?;
        if let Some(err) = state.list_faults.pop_front() {
            return Err(err);
        }
        Ok(state
            .objects
            .values()
            .map(|s| RemoteEntry {
                path: s.artifact.path.clone(),
                kind: s.artifact.kind(),
                digest: s.digest.clone(),
                version: s.version.clone(),
                dependencies: s.artifact.metadata.dependencies(),
            })
            .collect())
    }

    fn fetch(
        &self,
        credential: &Credential,
        path: &ArtifactPath,
    ) -> Result<RemoteArtifact, RemoteError> {
        let mut state = self.lock();
        check_token(&state, credential)?;
        take_fault(&mut state, path)?;
        state
            .objects
            .get(path)
            .map(|s| RemoteArtifact {
                artifact: s.artifact.clone(),
                version: s.version.clone(),
            })
            .ok_or_else(|| RemoteError::NotFound {
                path: path.to_string(),
            })
    }

    fn push(
        &self,
        credential: &Credential,
        artifact: &Artifact,
        expected: Option<&RemoteVersion>,
    ) -> Result<RemoteVersion, RemoteError> {
        let mut state = self.lock();
        check_token(&state, credential)?;
        take_fault(&mut state, &artifact.path)?;
        let found = state.objects.get(&artifact.path).map(|s| s.version.clone());
        if found.as_ref() != expected {
            return Err(RemoteError::VersionConflict {
                path: artifact.path.to_string(),
                expected: expected.cloned(),
                found,
            });
        }
        let version = store(&mut state, artifact.clone())?;
        state.mutations.push(Mutation::Push(artifact.path.clone()));
        Ok(version)
    }

    fn delete(
        &self,
        credential: &Credential,
        path: &ArtifactPath,
        expected: &RemoteVersion,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock();
        check_token(&state, credential)?;
        take_fault(&mut state, path)?;
        let found = state.objects.get(path).map(|s| s.version.clone());
        match found {
            None => Err(RemoteError::NotFound {
                path: path.to_string(),
            }),
            Some(current) if &current != expected => Err(RemoteError::VersionConflict {
                path: path.to_string(),
                expected: Some(expected.clone()),
                found: Some(current),
            }),
            Some(_) => {
                state.objects.remove(path);
                state.mutations.push(Mutation::Delete(path.clone()));
                Ok(())
            }
        }
    }
}
