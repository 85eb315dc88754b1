//! [`AuthProvider`] backed by the remote's CLI login endpoints.
//!
//! ```text
//! POST {remote}/api/auth/cli/login        -> {"challenge_id", "login_url"}
//! GET  {remote}/api/auth/cli/login/{id}   -> {"status": "pending"|"approved"|"denied",
//!                                             "token"?, "expires_at"?}
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use wsync_core::Credential;

use crate::error::AuthError;
use crate::provider::{AuthProvider, LoginChallenge, LoginStatus};
use crate::store::FileCredentialStore;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpAuthProvider {
    remote: String,
    store: FileCredentialStore,
    agent: ureq::Agent,
    open_browser: bool,
}

#[derive(Debug, Deserialize)]
struct ChallengeResponse {
    challenge_id: String,
    login_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PollState {
    Pending,
    Approved,
    Denied,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    status: PollState,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

impl HttpAuthProvider {
    pub fn new(remote: &str, store: FileCredentialStore) -> Self {
        Self {
            remote: remote.trim_end_matches('/').to_string(),
            store,
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            open_browser: true,
        }
    }

    /// Print the login URL only; never launch a browser.
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    fn login_url(&self) -> String {
        format!("{}/api/auth/cli/login", self.remote)
    }
}

impl AuthProvider for HttpAuthProvider {
    fn read_credential(&self) -> Result<Option<Credential>, AuthError> {
        self.store.load()
    }

    fn write_credential(&self, credential: &Credential) -> Result<(), AuthError> {
        self.store.save(credential)
    }

    fn clear_credential(&self) -> Result<(), AuthError> {
        self.store.clear()
    }

    fn begin_login(&self) -> Result<LoginChallenge, AuthError> {
        let response = self
            .agent
            .post(&self.login_url())
            .send_json(serde_json::json!({ "client": "wsync" }))
            .map_err(map_ureq)?;
        let body: ChallengeResponse = response
            .into_json()
            .map_err(|e| AuthError::Protocol(e.to_string()))?;
        tracing::debug!("login challenge {} issued", body.challenge_id);
        Ok(LoginChallenge {
            id: body.challenge_id,
            login_url: body.login_url,
        })
    }

    fn poll_login(&self, challenge: &LoginChallenge) -> Result<LoginStatus, AuthError> {
        let url = format!("{}/{}", self.login_url(), challenge.id);
        let response = self.agent.get(&url).call().map_err(map_ureq)?;
        let body: PollResponse = response
            .into_json()
            .map_err(|e| AuthError::Protocol(e.to_string()))?;
        match body.status {
            PollState::Pending => Ok(LoginStatus::Pending),
            PollState::Denied => Ok(LoginStatus::Denied),
            PollState::Approved => {
                let token = body.token.filter(|t| !t.is_empty()).ok_or_else(|| {
                    AuthError::Protocol("approved login carried no token".into())
                })?;
                Ok(LoginStatus::Approved(Credential::new(token, body.expires_at)))
            }
        }
    }

    fn open_login_url(&self, url: &str) -> Result<(), AuthError> {
        eprintln!("To log in, open this URL in your browser:\n  {url}");
        if self.open_browser {
            webbrowser::open(url).map_err(|e| AuthError::Protocol(format!("browser: {e}")))?;
        }
        Ok(())
    }
}

/// Transport failures and 5xx are retryable; other statuses are protocol errors.
fn map_ureq(err: ureq::Error) -> AuthError {
    match err {
        ureq::Error::Status(code, _) if code >= 500 => {
            AuthError::Network(format!("login endpoint returned HTTP {code}"))
        }
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            AuthError::Protocol(format!("HTTP {code}: {}", body.trim()))
        }
        ureq::Error::Transport(transport) => AuthError::Network(transport.to_string()),
    }
}
