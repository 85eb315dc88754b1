//! `wsync login` and `wsync logout`.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use super::context::{cancel_on_interrupt, SyncContext};
use crate::GlobalArgs;

/// Arguments for `wsync login`.
#[derive(Args, Debug)]
pub struct LoginArgs {}

impl LoginArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        let ctx = SyncContext::open(global)?;
        let session = ctx.session();
        let cancel = cancel_on_interrupt();

        let credential = session
            .login(&cancel)
            .with_context(|| format!("login to {} failed", ctx.profile.remote))?;
        let expiry = credential
            .expires_at
            .map_or_else(|| "no expiry".to_string(), |at| format!("expires {}", at.to_rfc3339()));
        println!(
            "{} logged in to {} as profile '{}' ({expiry})",
            "✓".green(),
            ctx.profile.remote,
            ctx.profile.name
        );
        Ok(ExitCode::SUCCESS)
    }
}

/// Arguments for `wsync logout`.
#[derive(Args, Debug)]
pub struct LogoutArgs {}

impl LogoutArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        let ctx = SyncContext::open(global)?;
        ctx.session()
            .logout()
            .context("failed to remove stored credential")?;
        println!("Logged out of profile '{}'.", ctx.profile.name);
        Ok(ExitCode::SUCCESS)
    }
}
