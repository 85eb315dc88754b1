//! SyncExecutor: applies a [`SyncPlan`] item by item.
//!
//! ## Scheduling
//!
//! Phases (writes, deletes, bookkeeping) run one after another. Within a
//! phase up to `workers` items run at once; each worker takes the first
//! waiting item in plan order whose prerequisites have all finished. An item
//! whose prerequisite did not succeed is skipped as blocked.
//!
//! ## Per-item protocol
//!
//! 1. Re-check the local side against the planned fingerprint.
//! 2. Call the remote, guarded by the planned remote version.
//! 3. Apply the local side (write or delete the file).
//! 4. Record the manifest entry before the item counts as done.
//!
//! Transient remote failures are retried with exponential backoff. A
//! rejected credential triggers one re-resolution and one retry. A version
//! conflict turns the item into a conflict. Manifest failures and failed
//! re-authentication abort the run.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use wsync_auth::{AuthError, AuthSession, ResolveOptions};
use wsync_core::{ArtifactPath, CancelToken, Credential, SyncSettings};
use wsync_remote::{RemoteError, RemoteWorkspace};

use crate::error::{ManifestError, SyncError};
use crate::local_tree::{is_secret, LocalArtifact, LocalTree};
use crate::planner::{ActionKind, NoopReason, Phase, SyncAction, SyncPlan};
use crate::report::{Outcome, SkipReason, SyncReport, SyncResult};
use crate::schema::{self, NoSchema, SchemaInferrer};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// What to do with planned conflicts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Report and leave both sides alone.
    #[default]
    Skip,
    /// Make the remote match the local side.
    PreferLocal,
    /// Make the local side match the remote.
    PreferRemote,
}

/// Bounded exponential backoff for transient remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, `attempt` starting at 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    pub workers: usize,
    pub conflict_policy: ConflictPolicy,
    pub retry: RetryPolicy,
    /// Whether re-authentication may start an interactive login.
    pub interactive: bool,
}

impl ExecutorOptions {
    /// Worker count and retry budget from `wsync.yaml`.
    pub fn from_settings(settings: &SyncSettings) -> Self {
        let defaults = Self::default();
        Self {
            workers: settings.workers.max(1),
            retry: RetryPolicy {
                max_attempts: settings.retry_attempts.max(1),
                ..defaults.retry
            },
            ..defaults
        }
    }
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            conflict_policy: ConflictPolicy::Skip,
            retry: RetryPolicy::default(),
            interactive: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Item errors
// ---------------------------------------------------------------------------

/// How a single item stopped short of success.
enum ItemError {
    Remote(RemoteError),
    Failed(String),
    Cancelled,
    /// Aborts the whole run.
    Fatal(SyncError),
}

impl From<ManifestError> for ItemError {
    fn from(err: ManifestError) -> Self {
        ItemError::Fatal(SyncError::Manifest(err))
    }
}

impl From<SyncError> for ItemError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Manifest(_) | SyncError::Auth(_) => ItemError::Fatal(err),
            SyncError::Cancelled => ItemError::Cancelled,
            other => ItemError::Failed(other.to_string()),
        }
    }
}

impl From<AuthError> for ItemError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Cancelled => ItemError::Cancelled,
            other => ItemError::Fatal(SyncError::Auth(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduling board
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Waiting,
    Running,
    Done { ok: bool },
}

struct BoardState {
    slots: Vec<Slot>,
    fatal: Option<SyncError>,
}

struct Board {
    state: Mutex<BoardState>,
    changed: Condvar,
}

impl Board {
    fn new(n: usize) -> Self {
        Self {
            state: Mutex::new(BoardState {
                slots: vec![Slot::Waiting; n],
                fatal: None,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// First waiting slot, in plan order, whose prerequisites are all done.
fn next_ready(slots: &[Slot], prerequisites: &[Vec<usize>]) -> Option<usize> {
    (0..slots.len()).find(|&idx| {
        slots[idx] == Slot::Waiting
            && prerequisites[idx]
                .iter()
                .all(|&p| matches!(slots[p], Slot::Done { .. }))
    })
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct SyncExecutor<'a> {
    remote: &'a dyn RemoteWorkspace,
    tree: &'a LocalTree,
    session: &'a AuthSession,
    schema: &'a dyn SchemaInferrer,
    options: ExecutorOptions,
    cancel: CancelToken,
    credential: Mutex<Credential>,
    reauth: Mutex<()>,
}

impl<'a> SyncExecutor<'a> {
    pub fn new(
        remote: &'a dyn RemoteWorkspace,
        tree: &'a LocalTree,
        session: &'a AuthSession,
        credential: Credential,
        options: ExecutorOptions,
        cancel: CancelToken,
    ) -> Self {
        Self {
            remote,
            tree,
            session,
            schema: &NoSchema,
            options,
            cancel,
            credential: Mutex::new(credential),
            reauth: Mutex::new(()),
        }
    }

    pub fn with_schema_inferrer(mut self, inferrer: &'a dyn SchemaInferrer) -> Self {
        self.schema = inferrer;
        self
    }

    /// Apply `plan`, calling `on_result` as each item finishes.
    pub fn execute(
        &self,
        plan: SyncPlan,
        mut on_result: impl FnMut(&SyncResult),
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        for phase in [Phase::Write, Phase::Delete, Phase::Bookkeeping] {
            let batch: Vec<SyncAction> = plan
                .actions
                .iter()
                .filter(|a| a.action.phase() == phase)
                .cloned()
                .collect();
            if batch.is_empty() {
                continue;
            }
            tracing::debug!("{phase:?} phase: {} items", batch.len());
            report
                .results
                .extend(self.run_phase(&batch, &mut on_result)?);
        }
        report.cancelled = self.cancel.is_cancelled();
        Ok(report)
    }

    fn run_phase(
        &self,
        actions: &[SyncAction],
        on_result: &mut dyn FnMut(&SyncResult),
    ) -> Result<Vec<SyncResult>, SyncError> {
        let index: HashMap<&ArtifactPath, usize> = actions
            .iter()
            .enumerate()
            .map(|(idx, a)| (&a.path, idx))
            .collect();
        let prerequisites: Vec<Vec<usize>> = actions
            .iter()
            .map(|a| {
                a.prerequisites
                    .iter()
                    .filter_map(|p| index.get(p).copied())
                    .collect()
            })
            .collect();

        let board = Board::new(actions.len());
        let workers = self.options.workers.clamp(1, actions.len());
        let mut results: Vec<Option<SyncResult>> = vec![None; actions.len()];
        let (tx, rx) = mpsc::channel::<(usize, SyncResult)>();

        thread::scope(|scope| {
            let board = &board;
            let prerequisites = &prerequisites;
            for _ in 0..workers {
                let tx = tx.clone();
                scope.spawn(move || self.worker(actions, prerequisites, board, tx));
            }
            drop(tx);
            for (idx, result) in rx {
                on_result(&result);
                results[idx] = Some(result);
            }
        });

        if let Some(fatal) = board.lock().fatal.take() {
            return Err(fatal);
        }
        Ok(results.into_iter().flatten().collect())
    }

    fn worker(
        &self,
        actions: &[SyncAction],
        prerequisites: &[Vec<usize>],
        board: &Board,
        tx: mpsc::Sender<(usize, SyncResult)>,
    ) {
        loop {
            let (idx, blocked_on) = {
                let mut state = board.lock();
                let idx = loop {
                    if state.fatal.is_some() {
                        return;
                    }
                    if let Some(idx) = next_ready(&state.slots, prerequisites) {
                        break idx;
                    }
                    if !state.slots.contains(&Slot::Waiting) {
                        return;
                    }
                    state = board
                        .changed
                        .wait(state)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                };
                state.slots[idx] = Slot::Running;
                let blocked_on = prerequisites[idx]
                    .iter()
                    .copied()
                    .find(|&p| state.slots[p] == Slot::Done { ok: false });
                (idx, blocked_on)
            };

            let action = &actions[idx];
            let outcome = match blocked_on {
                Some(_) if self.cancel.is_cancelled() => Outcome::Skipped(SkipReason::Cancelled),
                Some(on) => {
                    tracing::warn!("{}: blocked by {}", action.path, actions[on].path);
                    Outcome::Skipped(SkipReason::BlockedByDependency {
                        on: actions[on].path.clone(),
                    })
                }
                None => match self.run_item(action) {
                    Ok(outcome) => outcome,
                    Err(ItemError::Fatal(err)) => {
                        tracing::error!("{}: aborting run: {err}", action.path);
                        let mut state = board.lock();
                        if state.fatal.is_none() {
                            state.fatal = Some(err);
                        }
                        state.slots[idx] = Slot::Done { ok: false };
                        drop(state);
                        board.changed.notify_all();
                        return;
                    }
                    Err(ItemError::Remote(err)) if err.is_conflict() => {
                        tracing::warn!("{}: {err}", action.path);
                        conflicted(action)
                    }
                    Err(ItemError::Remote(err)) => {
                        tracing::warn!("{}: {err}", action.path);
                        Outcome::Failed(err.to_string())
                    }
                    Err(ItemError::Failed(reason)) => {
                        tracing::warn!("{}: {reason}", action.path);
                        Outcome::Failed(reason)
                    }
                    Err(ItemError::Cancelled) => Outcome::Skipped(SkipReason::Cancelled),
                },
            };

            {
                let mut state = board.lock();
                state.slots[idx] = Slot::Done {
                    ok: outcome.is_success(),
                };
            }
            board.changed.notify_all();
            let _ = tx.send((idx, SyncResult::new(action, outcome)));
        }
    }

    // -----------------------------------------------------------------------
    // Items
    // -----------------------------------------------------------------------

    fn run_item(&self, action: &SyncAction) -> Result<Outcome, ItemError> {
        match action.action {
            ActionKind::Noop(NoopReason::Unchanged) => return Ok(Outcome::Unchanged),
            ActionKind::Noop(NoopReason::Filtered(transfer)) => {
                return Ok(Outcome::Skipped(SkipReason::DirectionFiltered(transfer)))
            }
            _ => {}
        }
        if self.cancel.is_cancelled() {
            return Err(ItemError::Cancelled);
        }

        match action.action {
            ActionKind::Push => self.push(action),
            ActionKind::Pull => self.pull(action),
            ActionKind::DeleteLocal => self.delete_local(action),
            ActionKind::DeleteRemote => self.delete_remote(action),
            ActionKind::Conflict(kind) => match self.options.conflict_policy {
                ConflictPolicy::Skip => {
                    tracing::warn!("{}: conflict ({kind:?}) left unresolved", action.path);
                    Ok(conflicted(action))
                }
                ConflictPolicy::PreferLocal if action.local.is_some() => self.push(action),
                ConflictPolicy::PreferLocal => self.delete_remote(action),
                ConflictPolicy::PreferRemote if action.remote.is_some() => self.pull(action),
                ConflictPolicy::PreferRemote => self.delete_local(action),
            },
            ActionKind::Noop(NoopReason::Converged) => {
                let (Some(digest), Some(version)) =
                    (action.local.clone(), action.remote_version.clone())
                else {
                    return Ok(Outcome::Unchanged);
                };
                self.tree.record_sync(&action.path, digest, version)?;
                Ok(Outcome::Applied)
            }
            ActionKind::Noop(NoopReason::Tombstone) => {
                self.tree.remove_manifest_entry(&action.path)?;
                Ok(Outcome::Applied)
            }
            ActionKind::Noop(_) => Ok(Outcome::Unchanged),
        }
    }

    fn push(&self, action: &SyncAction) -> Result<Outcome, ItemError> {
        let local = self
            .local_as_planned(action)?
            .ok_or_else(|| ItemError::Failed(format!("{} disappeared locally", action.path)))?;
        let artifact = schema::enrich(&local.artifact, self.schema);
        let expected = action.remote_version.as_ref();
        let version = self.call_remote(&action.path, |cred| {
            self.remote.push(cred, &artifact, expected)
        })?;
        self.tree.record_sync(&action.path, local.digest, version)?;
        tracing::info!("pushed {}", action.path);
        Ok(Outcome::Applied)
    }

    fn pull(&self, action: &SyncAction) -> Result<Outcome, ItemError> {
        let fetched = self.call_remote(&action.path, |cred| self.remote.fetch(cred, &action.path))?;
        if self.tree.settings().skip_secrets && is_secret(&fetched.artifact.metadata) {
            tracing::debug!("withholding remote secret variable {}", action.path);
            return Ok(Outcome::Skipped(SkipReason::Withheld));
        }
        let digest = fetched
            .artifact
            .digest()
            .map_err(|e| ItemError::Failed(e.to_string()))?;
        self.local_as_planned(action)?;
        self.tree.write_artifact(&fetched.artifact)?;
        self.tree.record_sync(&action.path, digest, fetched.version)?;
        tracing::info!("pulled {}", action.path);
        Ok(Outcome::Applied)
    }

    fn delete_local(&self, action: &SyncAction) -> Result<Outcome, ItemError> {
        self.local_as_planned(action)?;
        self.tree.delete_artifact(&action.path)?;
        self.tree.remove_manifest_entry(&action.path)?;
        Ok(Outcome::Applied)
    }

    fn delete_remote(&self, action: &SyncAction) -> Result<Outcome, ItemError> {
        let Some(expected) = action.remote_version.as_ref() else {
            return Err(ItemError::Failed(format!(
                "{} has no remote version to guard the delete",
                action.path
            )));
        };
        match self.call_remote(&action.path, |cred| {
            self.remote.delete(cred, &action.path, expected)
        }) {
            Ok(()) | Err(ItemError::Remote(RemoteError::NotFound { .. })) => {}
            Err(err) => return Err(err),
        }
        self.tree.remove_manifest_entry(&action.path)?;
        tracing::info!("deleted remote {}", action.path);
        Ok(Outcome::Applied)
    }

    /// The local artifact, provided it still matches the planned fingerprint.
    fn local_as_planned(&self, action: &SyncAction) -> Result<Option<LocalArtifact>, ItemError> {
        let current = self.tree.read_artifact(&action.path)?;
        if current.as_ref().map(|l| &l.digest) != action.local.as_ref() {
            return Err(ItemError::Failed(format!(
                "{} changed locally during the sync; run again to re-plan",
                action.path
            )));
        }
        Ok(current)
    }

    // -----------------------------------------------------------------------
    // Remote calls
    // -----------------------------------------------------------------------

    fn current_credential(&self) -> Credential {
        self.credential
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn call_remote<T>(
        &self,
        path: &ArtifactPath,
        mut op: impl FnMut(&Credential) -> Result<T, RemoteError>,
    ) -> Result<T, ItemError> {
        let retry = self.options.retry;
        let mut attempt = 1;
        let mut reauthenticated = false;
        loop {
            let credential = self.current_credential();
            match op(&credential) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_unauthorized() && !reauthenticated => {
                    tracing::info!("{path}: credential rejected, re-authenticating");
                    reauthenticated = true;
                    self.reauthenticate(&credential)?;
                }
                Err(err) if err.is_retryable() && attempt < retry.max_attempts => {
                    let delay = retry.delay(attempt);
                    tracing::warn!(
                        "{path}: attempt {attempt}/{} failed ({err}); retrying in {delay:?}",
                        retry.max_attempts
                    );
                    if self.cancel.sleep(delay) {
                        return Err(ItemError::Cancelled);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(ItemError::Remote(err)),
            }
        }
    }

    /// Replace `rejected` with a fresh credential. Concurrent callers that
    /// saw the same rejected token share one re-resolution.
    fn reauthenticate(&self, rejected: &Credential) -> Result<(), ItemError> {
        let _guard = self
            .reauth
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.current_credential().token != rejected.token {
            return Ok(());
        }
        self.session.invalidate(rejected)?;
        let fresh = self.session.resolve(&ResolveOptions {
            interactive: self.options.interactive,
            cancel: self.cancel.clone(),
        })?;
        *self
            .credential
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = fresh;
        Ok(())
    }
}

fn conflicted(action: &SyncAction) -> Outcome {
    Outcome::Conflicted {
        local: action.local.clone(),
        remote: action.remote.clone(),
        base: action.base.clone(),
    }
}
