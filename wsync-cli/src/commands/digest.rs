//! `wsync digest`: fingerprint of the local directory. Works offline.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use wsync_core::digest::{digest_prefix, digest_tree};
use wsync_sync::LocalTree;

use super::context::LocalContext;
use crate::GlobalArgs;

/// Arguments for `wsync digest`.
#[derive(Args, Debug)]
pub struct DigestArgs {
    /// Only include paths under this prefix.
    #[arg(long)]
    pub prefix: Option<String>,

    /// Also print one line per artifact.
    #[arg(long)]
    pub list: bool,
}

impl DigestArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        let local = LocalContext::open(global)?;
        let workspace = local.profile_name(global).unwrap_or("default").to_string();
        let tree = LocalTree::open(&local.root, &workspace, local.settings.clone())
            .with_context(|| format!("failed to open {}", local.root.display()))?;
        let listing = tree.list().context("failed to read local artifacts")?;

        let digest = match self.prefix.as_deref() {
            Some(prefix) => digest_prefix(listing.digests(), prefix),
            None => digest_tree(listing.digests()),
        };

        if self.list {
            for (path, fingerprint) in listing.digests() {
                if self.prefix.as_deref().map_or(true, |prefix| path.is_under(prefix)) {
                    println!("{fingerprint}  {path}");
                }
            }
        }
        println!("{digest}");

        for (path, err) in &listing.invalid {
            eprintln!("warning: {path} skipped: {err}");
        }
        Ok(ExitCode::SUCCESS)
    }
}
