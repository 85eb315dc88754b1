//! Shared setup: home, sync root, settings, profile, credentials and the
//! Ctrl-C handler.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use wsync_auth::{AuthSession, FileCredentialStore, HttpAuthProvider, ResolveOptions, TOKEN_ENV};
use wsync_core::{profile, settings, CancelToken, Credential, SyncSettings, WorkspaceProfile};
use wsync_remote::HttpWorkspace;
use wsync_sync::LocalTree;

use crate::GlobalArgs;

/// Where the local side lives. Needs no profile.
pub struct LocalContext {
    pub home: PathBuf,
    pub root: PathBuf,
    pub settings: SyncSettings,
}

impl LocalContext {
    pub fn open(global: &GlobalArgs) -> Result<Self> {
        let home = profile::home().context("could not determine home directory")?;
        let root = match &global.dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("could not determine current directory")?,
        };
        let settings = settings::load_at(&root)
            .with_context(|| format!("failed to load settings in {}", root.display()))?;
        Ok(Self {
            home,
            root,
            settings,
        })
    }

    /// Profile named by `--workspace`, then `wsync.yaml`, then the active one.
    pub fn profile_name<'a>(&'a self, global: &'a GlobalArgs) -> Option<&'a str> {
        global
            .workspace
            .as_deref()
            .or(self.settings.workspace.as_deref())
    }
}

/// Everything a command that talks to the remote needs.
pub struct SyncContext {
    pub local: LocalContext,
    pub profile: WorkspaceProfile,
}

impl SyncContext {
    pub fn open(global: &GlobalArgs) -> Result<Self> {
        let local = LocalContext::open(global)?;
        let profile = profile::resolve_at(&local.home, local.profile_name(global))
            .context("no workspace selected")?;
        tracing::debug!(
            "profile '{}' -> {} (workspace {})",
            profile.name,
            profile.remote,
            profile.workspace_id
        );
        Ok(Self { local, profile })
    }

    pub fn tree(&self) -> Result<LocalTree> {
        LocalTree::open(
            &self.local.root,
            &self.profile.name,
            self.local.settings.clone(),
        )
        .with_context(|| format!("failed to open {}", self.local.root.display()))
    }

    pub fn remote(&self) -> HttpWorkspace {
        HttpWorkspace::new(&self.profile.remote, &self.profile.workspace_id)
    }

    /// Session for this profile, seeded from `WSYNC_TOKEN` when set.
    pub fn session(&self) -> AuthSession {
        let store = FileCredentialStore::at(&self.local.home, &self.profile.name);
        let mut provider = HttpAuthProvider::new(&self.profile.remote, store);
        if !std::io::stderr().is_terminal() {
            provider = provider.without_browser();
        }
        let session = AuthSession::new(Arc::new(provider));
        if let Some(token) = env_token() {
            tracing::debug!("using token from {TOKEN_ENV}");
            session.seed(Credential::new(token, None));
        }
        session
    }

    pub fn resolve_options(&self, cancel: &CancelToken, allow_login: bool) -> ResolveOptions {
        ResolveOptions {
            interactive: allow_login && std::io::stdin().is_terminal(),
            cancel: cancel.clone(),
        }
    }
}

fn env_token() -> Option<String> {
    std::env::var(TOKEN_ENV)
        .ok()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Cancel `token` on the first Ctrl-C; exit on the second.
pub fn cancel_on_interrupt() -> CancelToken {
    let cancel = CancelToken::new();
    let handle = cancel.clone();
    let spawned = std::thread::Builder::new()
        .name("wsync-interrupt".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    tracing::warn!("cannot watch for Ctrl-C: {err}");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                eprintln!("interrupted; finishing in-flight items (Ctrl-C again to abort)");
                handle.cancel();
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            });
        });
    if let Err(err) = spawned {
        tracing::warn!("cannot watch for Ctrl-C: {err}");
    }
    cancel
}
