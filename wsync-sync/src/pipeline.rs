//! Sync pipeline entry point shared by every CLI command.
//!
//! credential → local walk + remote listing → [`Inventory`] → plan → execute.

use std::collections::{BTreeMap, BTreeSet};

use wsync_auth::{AuthSession, ResolveOptions};
use wsync_core::{ArtifactKind, ArtifactPath, CancelToken, ContentError, Credential, ManifestEntry};
use wsync_remote::{RemoteEntry, RemoteWorkspace};

use crate::executor::{ExecutorOptions, SyncExecutor};
use crate::local_tree::{LocalArtifact, LocalListing, LocalTree};
use crate::planner::{self, Direction, SyncPlan};
use crate::report::{SyncReport, SyncResult};
use crate::schema::SchemaInferrer;
use crate::SyncError;

/// Options for one [`sync`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub direction: Direction,
    pub executor: ExecutorOptions,
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// The three inputs of the planner, filtered to the paths this run may touch.
#[derive(Debug, Default)]
pub struct Inventory {
    pub local: BTreeMap<ArtifactPath, LocalArtifact>,
    pub manifest: BTreeMap<ArtifactPath, ManifestEntry>,
    pub remote: BTreeMap<ArtifactPath, RemoteEntry>,
    /// Paths left out of the plan because one side is unusable.
    pub rejected: BTreeMap<ArtifactPath, String>,
    /// Secret variables held back by `skip_secrets`.
    pub withheld: BTreeSet<ArtifactPath>,
}

impl Inventory {
    /// Combine the raw sides.
    ///
    /// A path that is invalid on either side is removed from all three maps
    /// so the planner never mistakes it for a deletion.
    pub fn build(
        tree: &LocalTree,
        listing: LocalListing,
        remote_entries: Vec<RemoteEntry>,
    ) -> Self {
        let settings = tree.settings();
        let mut rejected: BTreeMap<ArtifactPath, String> = listing
            .invalid
            .into_iter()
            .map(|(path, err)| (path, err.to_string()))
            .collect();

        let mut remote = BTreeMap::new();
        for entry in remote_entries {
            let inferred = ArtifactKind::infer(&entry.path);
            if inferred != Some(entry.kind) {
                let err = ContentError::KindMismatch {
                    path: entry.path.to_string(),
                    expected: inferred.map_or_else(|| "no artifact".to_string(), |k| k.to_string()),
                    found: entry.kind.to_string(),
                };
                tracing::warn!("remote {err}");
                rejected.insert(entry.path.clone(), err.to_string());
                continue;
            }
            if !settings.admits(&entry.path, entry.kind) {
                continue;
            }
            if let Some(previous) = remote.insert(entry.path.clone(), entry) {
                tracing::warn!("remote listed {} twice; keeping the last entry", previous.path);
            }
        }

        let manifest = tree
            .manifest()
            .into_iter()
            .filter(|(path, _)| {
                ArtifactKind::infer(path).is_some_and(|kind| settings.admits(path, kind))
            })
            .collect();

        let mut inventory = Self {
            local: listing.artifacts,
            manifest,
            remote,
            rejected: BTreeMap::new(),
            withheld: listing.withheld,
        };
        for path in inventory.withheld.clone() {
            inventory.forget(&path);
        }
        for path in rejected.keys() {
            inventory.forget(path);
        }
        inventory.rejected = rejected;
        inventory
    }

    fn forget(&mut self, path: &ArtifactPath) {
        self.local.remove(path);
        self.manifest.remove(path);
        self.remote.remove(path);
    }

    pub fn plan(&self, direction: Direction) -> SyncPlan {
        planner::plan(&self.local, &self.manifest, &self.remote, direction)
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Resolve a credential and gather both sides.
///
/// Returns the credential actually used, which differs from the resolved one
/// when the listing forced a re-authentication.
pub fn gather(
    tree: &LocalTree,
    remote: &dyn RemoteWorkspace,
    session: &AuthSession,
    resolve: &ResolveOptions,
) -> Result<(Inventory, Credential), SyncError> {
    let mut credential = session.resolve(resolve)?;
    let listing = tree.list()?;
    let entries = match remote.list(&credential) {
        Err(err) if err.is_unauthorized() => {
            tracing::info!("listing rejected the credential; re-authenticating");
            session.invalidate(&credential)?;
            credential = session.resolve(resolve)?;
            remote.list(&credential)?
        }
        other => other?,
    };
    tracing::debug!("remote listed {} artifacts", entries.len());
    Ok((Inventory::build(tree, listing, entries), credential))
}

/// Plan without executing; backs `--dry-run`, `status` and `diff`.
pub fn preview(
    tree: &LocalTree,
    remote: &dyn RemoteWorkspace,
    session: &AuthSession,
    direction: Direction,
    resolve: &ResolveOptions,
) -> Result<(Inventory, SyncPlan, Credential), SyncError> {
    let (inventory, credential) = gather(tree, remote, session, resolve)?;
    let plan = inventory.plan(direction);
    Ok((inventory, plan, credential))
}

/// Run one full sync, reporting each result through `on_result` as it lands.
pub fn sync(
    tree: &LocalTree,
    remote: &dyn RemoteWorkspace,
    session: &AuthSession,
    schema: &dyn SchemaInferrer,
    options: SyncOptions,
    cancel: &CancelToken,
    mut on_result: impl FnMut(&SyncResult),
) -> Result<SyncReport, SyncError> {
    let resolve = ResolveOptions {
        interactive: options.executor.interactive,
        cancel: cancel.clone(),
    };
    let (inventory, plan, credential) = preview(tree, remote, session, options.direction, &resolve)?;
    tracing::info!(
        "planned {} actions ({} pending, {} conflicts)",
        plan.actions.len(),
        plan.pending().count(),
        plan.conflicts().count()
    );

    let rejected: Vec<SyncResult> = inventory
        .rejected
        .into_iter()
        .map(|(path, reason)| SyncResult::rejected(path, reason))
        .collect();
    for result in &rejected {
        on_result(result);
    }

    let executor = SyncExecutor::new(remote, tree, session, credential, options.executor, cancel.clone())
        .with_schema_inferrer(schema);
    let mut report = executor.execute(plan, &mut on_result)?;
    let mut results = rejected;
    results.append(&mut report.results);
    report.results = results;
    Ok(report)
}
