//! SyncPlanner: three-way classification of every known path.
//!
//! Each path in the union of the local listing, the remote listing and the
//! manifest is classified from three fingerprints: `L` (local now),
//! `R` (remote now) and `M` (both sides at the last successful sync).
//!
//! | L      | R      | M       | action                                   |
//! |--------|--------|---------|------------------------------------------|
//! | = R    | = L    | = L     | noop (unchanged)                         |
//! | = R    | = L    | other   | noop, manifest refresh (converged)       |
//! | ≠ M    | = M    | present | push                                     |
//! | = M    | ≠ M    | present | pull                                     |
//! | ≠ M    | ≠ M, L | present | conflict                                 |
//! | ≠ R    | ≠ L    | absent  | conflict (created on both sides)         |
//! | = M    | absent | present | delete local                             |
//! | ≠ M    | absent | present | conflict (deleted remotely)              |
//! | absent | = M    | present | delete remote                            |
//! | absent | ≠ M    | present | conflict (deleted locally)               |
//! | yes    | absent | absent  | push                                     |
//! | absent | yes    | absent  | pull                                     |
//! | absent | absent | present | noop, drop manifest entry (tombstone)    |
//!
//! The planner never resolves a conflict and never touches disk or network.
//!
//! ## Ordering
//!
//! Actions are split into three phases run one after another: writes
//! (push, pull, conflict), deletes, then bookkeeping noops. Writes are
//! topologically ordered over dependency hints, ties broken by kind rank and
//! then path. Deletes use the reverse of that order so dependents go first.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use wsync_core::{ArtifactKind, ArtifactPath, Fingerprint, ManifestEntry, RemoteVersion};
use wsync_remote::RemoteEntry;

use crate::local_tree::LocalArtifact;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which way changes may flow in this run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    PushOnly,
    PullOnly,
    #[default]
    Both,
}

impl Direction {
    fn allows(self, transfer: Transfer) -> bool {
        match self {
            Direction::Both => true,
            Direction::PushOnly => matches!(transfer, Transfer::Push | Transfer::DeleteRemote),
            Direction::PullOnly => matches!(transfer, Transfer::Pull | Transfer::DeleteLocal),
        }
    }
}

/// A change that moves content between the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transfer {
    Push,
    Pull,
    DeleteLocal,
    DeleteRemote,
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transfer::Push => "push",
            Transfer::Pull => "pull",
            Transfer::DeleteLocal => "delete local",
            Transfer::DeleteRemote => "delete remote",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides changed since the last sync.
    BothModified,
    /// Both sides created the path with different content.
    BothCreated,
    /// Remote deleted the path; local modified it.
    DeletedRemotely,
    /// Local deleted the path; remote modified it.
    DeletedLocally,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoopReason {
    Unchanged,
    /// Both sides hold the same content; only the manifest needs updating.
    Converged,
    /// Deleted on both sides; only the manifest entry remains.
    Tombstone,
    /// Suppressed by the run's [`Direction`].
    Filtered(Transfer),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Push,
    Pull,
    DeleteLocal,
    DeleteRemote,
    Conflict(ConflictKind),
    Noop(NoopReason),
}

impl ActionKind {
    fn transfer(self) -> Option<Transfer> {
        match self {
            ActionKind::Push => Some(Transfer::Push),
            ActionKind::Pull => Some(Transfer::Pull),
            ActionKind::DeleteLocal => Some(Transfer::DeleteLocal),
            ActionKind::DeleteRemote => Some(Transfer::DeleteRemote),
            _ => None,
        }
    }

    pub fn is_noop(self) -> bool {
        matches!(self, ActionKind::Noop(_))
    }

    pub fn phase(self) -> Phase {
        match self {
            ActionKind::Push | ActionKind::Pull | ActionKind::Conflict(_) => Phase::Write,
            ActionKind::DeleteLocal | ActionKind::DeleteRemote => Phase::Delete,
            ActionKind::Noop(_) => Phase::Bookkeeping,
        }
    }

    /// Short label for tables and logs.
    pub fn label(self) -> &'static str {
        match self {
            ActionKind::Push => "push",
            ActionKind::Pull => "pull",
            ActionKind::DeleteLocal => "delete-local",
            ActionKind::DeleteRemote => "delete-remote",
            ActionKind::Conflict(_) => "conflict",
            ActionKind::Noop(NoopReason::Filtered(_)) => "skipped",
            ActionKind::Noop(_) => "noop",
        }
    }
}

/// Execution phase. Phases run strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Write,
    Delete,
    Bookkeeping,
}

/// One planned operation on one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncAction {
    pub path: ArtifactPath,
    pub action: ActionKind,
    pub artifact_kind: Option<ArtifactKind>,
    /// Local fingerprint (`L`).
    pub local: Option<Fingerprint>,
    /// Remote fingerprint (`R`).
    pub remote: Option<Fingerprint>,
    /// Fingerprint at the last sync (`M`).
    pub base: Option<Fingerprint>,
    /// Remote version seen when planning; guards every remote mutation.
    pub remote_version: Option<RemoteVersion>,
    /// Paths earlier in the plan that must finish before this one starts.
    pub prerequisites: Vec<ArtifactPath>,
}

/// Ordered actions for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub direction: Direction,
    pub actions: Vec<SyncAction>,
}

impl SyncPlan {
    /// True when executing would change nothing on either side.
    pub fn is_noop(&self) -> bool {
        self.actions.iter().all(|a| {
            matches!(
                a.action,
                ActionKind::Noop(NoopReason::Unchanged | NoopReason::Filtered(_))
            )
        })
    }

    /// Actions other than plain unchanged noops.
    pub fn pending(&self) -> impl Iterator<Item = &SyncAction> {
        self.actions
            .iter()
            .filter(|a| a.action != ActionKind::Noop(NoopReason::Unchanged))
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &SyncAction> {
        self.actions
            .iter()
            .filter(|a| matches!(a.action, ActionKind::Conflict(_)))
    }

    pub fn get(&self, path: &ArtifactPath) -> Option<&SyncAction> {
        self.actions.iter().find(|a| &a.path == path)
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify a path from its three fingerprints.
///
/// `versions_match` tells whether the manifest's remote version equals the
/// listed one; it only separates `Unchanged` from `Converged`.
pub fn classify(
    local: Option<&Fingerprint>,
    remote: Option<&Fingerprint>,
    base: Option<&Fingerprint>,
    versions_match: bool,
) -> Option<ActionKind> {
    Some(match (local, remote, base) {
        (Some(l), Some(r), m) if l == r => {
            if m == Some(l) && versions_match {
                ActionKind::Noop(NoopReason::Unchanged)
            } else {
                ActionKind::Noop(NoopReason::Converged)
            }
        }
        (Some(l), Some(r), Some(m)) => {
            if l != m && r == m {
                ActionKind::Push
            } else if l == m && r != m {
                ActionKind::Pull
            } else {
                ActionKind::Conflict(ConflictKind::BothModified)
            }
        }
        (Some(_), Some(_), None) => ActionKind::Conflict(ConflictKind::BothCreated),
        (Some(l), None, Some(m)) if l == m => ActionKind::DeleteLocal,
        (Some(_), None, Some(_)) => ActionKind::Conflict(ConflictKind::DeletedRemotely),
        (Some(_), None, None) => ActionKind::Push,
        (None, Some(r), Some(m)) if r == m => ActionKind::DeleteRemote,
        (None, Some(_), Some(_)) => ActionKind::Conflict(ConflictKind::DeletedLocally),
        (None, Some(_), None) => ActionKind::Pull,
        (None, None, Some(_)) => ActionKind::Noop(NoopReason::Tombstone),
        (None, None, None) => return None,
    })
}

/// Build the plan for one run.
pub fn plan(
    local: &BTreeMap<ArtifactPath, LocalArtifact>,
    manifest: &BTreeMap<ArtifactPath, ManifestEntry>,
    remote: &BTreeMap<ArtifactPath, RemoteEntry>,
    direction: Direction,
) -> SyncPlan {
    let paths: BTreeSet<&ArtifactPath> = local
        .keys()
        .chain(remote.keys())
        .chain(manifest.keys())
        .collect();

    let mut actions = Vec::with_capacity(paths.len());
    let mut hints: BTreeMap<ArtifactPath, Vec<ArtifactPath>> = BTreeMap::new();

    for path in paths {
        let l = local.get(path);
        let r = remote.get(path);
        let m = manifest.get(path);
        let versions_match = match (r, m) {
            (Some(r), Some(m)) => r.version == m.remote_version,
            _ => false,
        };
        let Some(mut action) = classify(
            l.map(|a| &a.digest),
            r.map(|e| &e.digest),
            m.map(|e| &e.digest),
            versions_match,
        ) else {
            continue;
        };
        if let Some(transfer) = action.transfer() {
            if !direction.allows(transfer) {
                tracing::warn!("{path}: would {transfer}, but the run is {direction:?}");
                action = ActionKind::Noop(NoopReason::Filtered(transfer));
            }
        }
        tracing::debug!("{path}: {action:?}");

        let mut deps: Vec<ArtifactPath> = Vec::new();
        if let Some(l) = l {
            deps.extend(l.artifact.metadata.dependencies());
        }
        if let Some(r) = r {
            deps.extend(r.dependencies.iter().cloned());
        }
        if !deps.is_empty() {
            hints.insert(path.clone(), deps);
        }

        actions.push(SyncAction {
            path: path.clone(),
            action,
            artifact_kind: l
                .map(|a| a.artifact.kind())
                .or(r.map(|e| e.kind))
                .or_else(|| ArtifactKind::infer(path)),
            local: l.map(|a| a.digest.clone()),
            remote: r.map(|e| e.digest.clone()),
            base: m.map(|e| e.digest.clone()),
            remote_version: r.map(|e| e.version.clone()),
            prerequisites: Vec::new(),
        });
    }

    SyncPlan {
        direction,
        actions: order(actions, &hints),
    }
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

fn rank(action: &SyncAction) -> u8 {
    action.artifact_kind.map_or(u8::MAX, ArtifactKind::rank)
}

fn order(
    actions: Vec<SyncAction>,
    hints: &BTreeMap<ArtifactPath, Vec<ArtifactPath>>,
) -> Vec<SyncAction> {
    let mut writes = Vec::new();
    let mut deletes = Vec::new();
    let mut bookkeeping = Vec::new();
    for action in actions {
        match action.action.phase() {
            Phase::Write => writes.push(action),
            Phase::Delete => deletes.push(action),
            Phase::Bookkeeping => bookkeeping.push(action),
        }
    }

    let mut ordered = topological(writes, hints, false);
    ordered.extend(topological(deletes, hints, true));
    bookkeeping.sort_by(|a, b| a.path.cmp(&b.path));
    ordered.extend(bookkeeping);
    ordered
}

/// Kahn's algorithm over the dependency edges among `items`.
///
/// With `reverse`, dependents come first and become prerequisites of the
/// paths they depend on. Cycles are broken at the smallest remaining item.
fn topological(
    items: Vec<SyncAction>,
    hints: &BTreeMap<ArtifactPath, Vec<ArtifactPath>>,
    reverse: bool,
) -> Vec<SyncAction> {
    let n = items.len();
    let mut by_path: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_stem: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, item) in items.iter().enumerate() {
        by_path.insert(item.path.as_str(), idx);
        by_stem.entry(item.path.stem_path()).or_default().push(idx);
    }

    // edges[a] contains b when a must run before b.
    let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for (dependent, item) in items.iter().enumerate() {
        let Some(deps) = hints.get(&item.path) else {
            continue;
        };
        for hint in deps {
            let targets: Vec<usize> = match by_path.get(hint.as_str()) {
                Some(&idx) => vec![idx],
                None => by_stem.get(hint.as_str()).cloned().unwrap_or_default(),
            };
            for prerequisite in targets {
                if prerequisite == dependent {
                    continue;
                }
                if reverse {
                    edges[dependent].insert(prerequisite);
                } else {
                    edges[prerequisite].insert(dependent);
                }
            }
        }
    }

    let key = |idx: usize| (rank(&items[idx]), items[idx].path.clone());
    let mut incoming: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for (from, tos) in edges.iter().enumerate() {
        for &to in tos {
            incoming[to].insert(from);
        }
    }

    let mut ready: BTreeSet<(u8, ArtifactPath, usize)> = (0..n)
        .filter(|&idx| incoming[idx].is_empty())
        .map(|idx| {
            let (r, p) = key(idx);
            (r, p, idx)
        })
        .collect();
    let mut placed = vec![false; n];
    let mut sequence = Vec::with_capacity(n);
    let mut prerequisites: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut remaining_in: Vec<BTreeSet<usize>> = incoming.clone();

    while sequence.len() < n {
        let next = match ready.pop_first() {
            Some((_, _, idx)) => idx,
            None => {
                // Cycle: release the smallest unplaced item.
                let Some(idx) = (0..n)
                    .filter(|&idx| !placed[idx])
                    .min_by_key(|&idx| key(idx))
                else {
                    break;
                };
                tracing::warn!(
                    "dependency cycle through {}; ordering by kind and path",
                    items[idx].path
                );
                remaining_in[idx].clear();
                idx
            }
        };
        if placed[next] {
            continue;
        }
        placed[next] = true;
        sequence.push(next);
        prerequisites[next] = incoming[next]
            .iter()
            .copied()
            .filter(|&p| placed[p] && p != next)
            .collect();
        for &to in &edges[next] {
            if remaining_in[to].remove(&next) && remaining_in[to].is_empty() && !placed[to] {
                let (r, p) = key(to);
                ready.insert((r, p, to));
            }
        }
    }

    let paths: Vec<ArtifactPath> = items.iter().map(|i| i.path.clone()).collect();
    let mut slots: Vec<Option<SyncAction>> = items.into_iter().map(Some).collect();
    sequence
        .into_iter()
        .filter_map(|idx| {
            let mut action = slots[idx].take()?;
            let mut prereqs: Vec<ArtifactPath> =
                prerequisites[idx].iter().map(|&p| paths[p].clone()).collect();
            prereqs.sort();
            action.prerequisites = prereqs;
            Some(action)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
