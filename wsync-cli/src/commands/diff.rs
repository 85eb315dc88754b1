//! `wsync diff [PATH...]`: unified diffs for everything a sync would move.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use wsync_sync::{diff_plan, pipeline, Direction};

use super::context::{cancel_on_interrupt, SyncContext};
use crate::GlobalArgs;

/// Arguments for `wsync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Limit to these paths or path prefixes.
    pub paths: Vec<String>,
}

impl DiffArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        let ctx = SyncContext::open(global)?;
        let tree = ctx.tree()?;
        let remote = ctx.remote();
        let session = ctx.session();
        let cancel = cancel_on_interrupt();
        let resolve = ctx.resolve_options(&cancel, true);

        let (_, plan, credential) =
            pipeline::preview(&tree, &remote, &session, Direction::Both, &resolve)
                .context("failed to plan diff")?;
        let diffs = diff_plan(&plan, &tree, &remote, &credential, &self.paths)
            .context("failed to diff against the remote")?;

        if diffs.is_empty() {
            println!("No differences.");
            return Ok(ExitCode::SUCCESS);
        }

        for diff in diffs {
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}
