//! Unified diffs between remote and local content for `wsync diff`.
//!
//! `a/` is the remote side, `b/` the local side. Nothing is written.

use similar::TextDiff;

use wsync_core::{ArtifactPath, Credential};
use wsync_remote::RemoteWorkspace;

use crate::local_tree::LocalTree;
use crate::planner::{ActionKind, SyncPlan};
use crate::SyncError;

/// A single artifact diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDiff {
    pub path: ArtifactPath,
    pub action: ActionKind,
    pub unified_diff: String,
}

/// Diff every planned transfer or conflict, optionally limited to `filter`
/// (exact paths or prefixes).
pub fn diff_plan(
    plan: &SyncPlan,
    tree: &LocalTree,
    remote: &dyn RemoteWorkspace,
    credential: &Credential,
    filter: &[String],
) -> Result<Vec<ArtifactDiff>, SyncError> {
    let mut diffs = Vec::new();
    for action in &plan.actions {
        if action.action.is_noop() {
            continue;
        }
        if !filter.is_empty() && !filter.iter().any(|prefix| action.path.is_under(prefix)) {
            continue;
        }

        let remote_text = match action.remote {
            Some(_) => remote.fetch(credential, &action.path)?.artifact.content,
            None => String::new(),
        };
        let local_text = tree
            .read_artifact(&action.path)?
            .map(|local| local.artifact.content)
            .unwrap_or_default();

        let unified = unified_diff(&action.path, &remote_text, &local_text);
        if unified.is_empty() {
            continue;
        }
        diffs.push(ArtifactDiff {
            path: action.path.clone(),
            action: action.action,
            unified_diff: unified,
        });
    }
    Ok(diffs)
}

/// Line diff from `remote` to `local`; empty when they differ only in line
/// endings.
pub fn unified_diff(path: &ArtifactPath, remote: &str, local: &str) -> String {
    let remote = normalize_line_endings(remote);
    let local = normalize_line_endings(local);
    if remote == local {
        return String::new();
    }
    let old_header = format!("a/{path}");
    let new_header = format!("b/{path}");
    TextDiff::from_lines(&remote, &local)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string()
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n")
}
