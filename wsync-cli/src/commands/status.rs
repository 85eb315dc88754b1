//! `wsync status`: the plan a sync would run, plus local tree state.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use wsync_sync::{pipeline, Direction, SyncAction};

use super::context::{cancel_on_interrupt, SyncContext};
use super::render;
use crate::GlobalArgs;

/// Arguments for `wsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusJson<'a> {
    workspace: &'a str,
    remote: &'a str,
    workspace_id: &'a str,
    tree_digest: String,
    synced_at: Option<String>,
    pending: usize,
    conflicts: usize,
    actions: &'a [SyncAction],
    rejected: Vec<RejectedJson<'a>>,
    withheld: usize,
}

#[derive(Serialize)]
struct RejectedJson<'a> {
    path: &'a str,
    reason: &'a str,
}

impl StatusArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        let ctx = SyncContext::open(global)?;
        let tree = ctx.tree()?;
        let remote = ctx.remote();
        let session = ctx.session();
        let cancel = cancel_on_interrupt();
        let resolve = ctx.resolve_options(&cancel, !self.json);

        let (inventory, plan, _) =
            pipeline::preview(&tree, &remote, &session, Direction::Both, &resolve)
                .context("failed to compute status")?;
        let tree_digest = wsync_core::digest::digest_tree(
            inventory.local.iter().map(|(path, local)| (path, &local.digest)),
        );
        let synced_at = tree.synced_at();

        if self.json {
            let payload = StatusJson {
                workspace: &ctx.profile.name,
                remote: &ctx.profile.remote,
                workspace_id: &ctx.profile.workspace_id,
                tree_digest: tree_digest.to_string(),
                synced_at: synced_at.map(|at| at.to_rfc3339()),
                pending: plan.pending().count(),
                conflicts: plan.conflicts().count(),
                actions: &plan.actions,
                rejected: inventory
                    .rejected
                    .iter()
                    .map(|(path, reason)| RejectedJson {
                        path: path.as_str(),
                        reason,
                    })
                    .collect(),
                withheld: inventory.withheld.len(),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(ExitCode::SUCCESS);
        }

        println!(
            "wsync v{} | {} → {}/{} | tree {} | last sync {}",
            env!("CARGO_PKG_VERSION"),
            ctx.local.root.display(),
            ctx.profile.remote,
            ctx.profile.workspace_id.bold(),
            tree_digest.short(),
            synced_at.map_or_else(|| "never".to_string(), render::format_age),
        );
        render::print_plan(&plan);
        for (path, reason) in &inventory.rejected {
            println!("  {} {path}: {reason}", "✗".red().bold());
        }
        if !inventory.withheld.is_empty() {
            println!(
                "{} secret variables withheld (skip_secrets)",
                inventory.withheld.len()
            );
        }
        if !plan.is_noop() {
            println!("Run 'wsync sync' to apply.");
        }
        Ok(ExitCode::SUCCESS)
    }
}
