//! wsync: keep a local directory in sync with a remote workspace.
//!
//! # Usage
//!
//! ```text
//! wsync sync [--dry-run] [--conflict skip|prefer-local|prefer-remote]
//! wsync push [--dry-run] [--conflict ...]
//! wsync pull [--dry-run] [--conflict ...]
//! wsync status [--json]
//! wsync diff [PATH...]
//! wsync digest [--prefix PREFIX]
//! wsync login | logout
//! wsync workspace add <name> --remote <url> --workspace-id <id>
//! wsync workspace list | switch <name> | remove <name>
//! ```
//!
//! Global flags: `--workspace/-w` (or `WSYNC_WORKSPACE`), `--dir/-C`,
//! `--verbose/-v`. `WSYNC_TOKEN` supplies a token without logging in.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use commands::{
    auth::{LoginArgs, LogoutArgs},
    diff::DiffArgs,
    digest::DigestArgs,
    status::StatusArgs,
    sync::TransferArgs,
    workspace::WorkspaceCommand,
};
use wsync_sync::{Direction, RunStatus};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "wsync",
    version,
    about = "Synchronize a local directory with a remote workspace",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags accepted by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Workspace profile to use instead of the active one.
    #[arg(long, short = 'w', global = true, env = "WSYNC_WORKSPACE")]
    pub workspace: Option<String>,

    /// Directory to sync. Defaults to the current directory.
    #[arg(long = "dir", short = 'C', global = true, value_name = "PATH")]
    pub dir: Option<PathBuf>,

    /// Log progress (equivalent to RUST_LOG=info).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Push local changes and pull remote changes.
    Sync(TransferArgs),

    /// Only send local changes to the remote.
    Push(TransferArgs),

    /// Only bring remote changes into the local directory.
    Pull(TransferArgs),

    /// Show what a sync would do.
    Status(StatusArgs),

    /// Show unified diffs between remote and local content.
    Diff(DiffArgs),

    /// Print the content digest of the local directory.
    Digest(DigestArgs),

    /// Log in to the active workspace's remote.
    Login(LoginArgs),

    /// Forget the stored credential for the active workspace.
    Logout(LogoutArgs),

    /// Manage workspace profiles.
    Workspace {
        #[command(subcommand)]
        command: WorkspaceCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let global = cli.global;
    match cli.command {
        Commands::Sync(args) => args.run(&global, Direction::Both),
        Commands::Push(args) => args.run(&global, Direction::PushOnly),
        Commands::Pull(args) => args.run(&global, Direction::PullOnly),
        Commands::Status(args) => args.run(&global),
        Commands::Diff(args) => args.run(&global),
        Commands::Digest(args) => args.run(&global),
        Commands::Login(args) => args.run(&global),
        Commands::Logout(args) => args.run(&global),
        Commands::Workspace { command } => commands::workspace::run(command),
    }
}

/// `RUST_LOG` wins; otherwise `warn`, or `info` with `--verbose`.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// 0 clean, 1 failed, 2 conflicts or skips.
pub fn exit_code(status: RunStatus) -> ExitCode {
    match status {
        RunStatus::Clean => ExitCode::SUCCESS,
        RunStatus::Failed => ExitCode::from(1),
        RunStatus::Partial => ExitCode::from(2),
    }
}
