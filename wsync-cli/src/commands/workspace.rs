//! `wsync workspace add|list|switch|remove`

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use wsync_auth::FileCredentialStore;
use wsync_core::profile;

use super::render::format_age;

/// Manage workspace profiles under `~/.wsync/workspaces/`.
#[derive(Subcommand, Debug)]
pub enum WorkspaceCommand {
    /// Add a profile, or update an existing one.
    Add(AddArgs),

    /// List all profiles.
    List,

    /// Make a profile the active one.
    Switch { name: String },

    /// Delete a profile and its stored credential.
    Remove { name: String },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Profile name (letters, digits, '-' or '_').
    pub name: String,

    /// Base URL of the remote service.
    #[arg(long)]
    pub remote: String,

    /// Workspace identifier on the remote.
    #[arg(long = "workspace-id")]
    pub workspace_id: String,

    /// Make this profile active even if another one is.
    #[arg(long)]
    pub switch: bool,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "")]
    active: &'static str,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "remote")]
    remote: String,
    #[tabled(rename = "workspace")]
    workspace_id: String,
    #[tabled(rename = "updated")]
    updated: String,
}

pub fn run(cmd: WorkspaceCommand) -> Result<ExitCode> {
    let home = profile::home().context("could not determine home directory")?;
    match cmd {
        WorkspaceCommand::Add(args) => {
            let added = profile::add_at(&home, &args.name, &args.remote, &args.workspace_id)
                .with_context(|| format!("failed to add profile '{}'", args.name))?;
            if args.switch {
                profile::set_active_at(&home, &added.name)?;
            }
            println!(
                "{} profile '{}' → {} (workspace {})",
                "✓".green(),
                added.name,
                added.remote,
                added.workspace_id
            );
        }
        WorkspaceCommand::List => {
            let profiles = profile::list_at(&home).context("failed to list profiles")?;
            if profiles.is_empty() {
                println!("No workspace profiles.");
                println!("Run: wsync workspace add <name> --remote <url> --workspace-id <id>");
                return Ok(ExitCode::SUCCESS);
            }
            let active = profile::active_at(&home)?;
            let rows: Vec<ProfileRow> = profiles
                .into_iter()
                .map(|p| ProfileRow {
                    active: if active.as_deref() == Some(p.name.as_str()) {
                        "*"
                    } else {
                        ""
                    },
                    updated: format_age(p.updated_at),
                    name: p.name,
                    remote: p.remote,
                    workspace_id: p.workspace_id,
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        WorkspaceCommand::Switch { name } => {
            profile::set_active_at(&home, &name)
                .with_context(|| format!("cannot switch to '{name}'"))?;
            println!("{} active profile is now '{name}'", "✓".green());
        }
        WorkspaceCommand::Remove { name } => {
            if !profile::remove_at(&home, &name)? {
                anyhow::bail!("no profile named '{name}'");
            }
            FileCredentialStore::at(&home, &name)
                .clear()
                .context("failed to remove stored credential")?;
            println!("Removed profile '{name}'.");
        }
    }
    Ok(ExitCode::SUCCESS)
}
