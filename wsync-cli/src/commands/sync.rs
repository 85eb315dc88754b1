//! `wsync sync`, `wsync push` and `wsync pull`.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;

use wsync_sync::{pipeline, ConflictPolicy, Direction, ExecutorOptions, NoSchema, SyncOptions};

use super::context::{cancel_on_interrupt, SyncContext};
use super::render;
use crate::{exit_code, GlobalArgs};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConflictArg {
    /// Report conflicts and leave both sides alone.
    Skip,
    /// Overwrite the remote with the local copy.
    PreferLocal,
    /// Overwrite the local copy with the remote.
    PreferRemote,
}

impl From<ConflictArg> for ConflictPolicy {
    fn from(arg: ConflictArg) -> Self {
        match arg {
            ConflictArg::Skip => ConflictPolicy::Skip,
            ConflictArg::PreferLocal => ConflictPolicy::PreferLocal,
            ConflictArg::PreferRemote => ConflictPolicy::PreferRemote,
        }
    }
}

/// Arguments shared by `sync`, `push` and `pull`.
#[derive(Args, Debug)]
pub struct TransferArgs {
    /// Show the plan without changing either side.
    #[arg(long)]
    pub dry_run: bool,

    /// How to resolve paths changed on both sides.
    #[arg(long, value_enum, default_value = "skip")]
    pub conflict: ConflictArg,

    /// Never start a browser login; fail if no credential is available.
    #[arg(long)]
    pub non_interactive: bool,
}

impl TransferArgs {
    pub fn run(self, global: &GlobalArgs, direction: Direction) -> Result<ExitCode> {
        let ctx = SyncContext::open(global)?;
        let tree = ctx.tree()?;
        let remote = ctx.remote();
        let session = ctx.session();
        let cancel = cancel_on_interrupt();
        let resolve = ctx.resolve_options(&cancel, !self.non_interactive);

        if self.dry_run {
            let (inventory, plan, _) =
                pipeline::preview(&tree, &remote, &session, direction, &resolve)
                    .context("failed to plan sync")?;
            println!(
                "[dry-run] {} → {} ({:?})",
                ctx.local.root.display(),
                ctx.profile.name,
                direction
            );
            render::print_plan(&plan);
            for (path, reason) in &inventory.rejected {
                println!("  {} {path}: {reason}", "✗".red().bold());
            }
            return Ok(ExitCode::SUCCESS);
        }

        let options = SyncOptions {
            direction,
            executor: ExecutorOptions {
                conflict_policy: self.conflict.into(),
                interactive: resolve.interactive,
                ..ExecutorOptions::from_settings(&ctx.local.settings)
            },
        };
        let report = pipeline::sync(
            &tree,
            &remote,
            &session,
            &NoSchema,
            options,
            &cancel,
            render::print_result,
        )
        .with_context(|| format!("sync with '{}' failed", ctx.profile.name))?;

        render::print_summary(&report);
        Ok(exit_code(report.status()))
    }
}
