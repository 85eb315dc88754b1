//! Credential lifecycle for one workspace profile.
//!
//! # States
//!
//! ```text
//! NoCredential ──(stored credential)──────────────► Authenticated
//!      │                                                │   ▲
//!      └─(interactive)─► Pending ──(approved)───────────┘   │
//!                           │  ──(denied / timeout)──► Expired
//!                           └──(cancelled)──► NoCredential  │
//! Authenticated ──(expiry or rejection)──► Expired ─────────┘
//! ```
//!
//! At most one interactive login runs per session. Callers that arrive while
//! a login is `Pending` wait for it and share its outcome.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use wsync_core::{CancelToken, Credential};

use crate::error::AuthError;
use crate::provider::{AuthProvider, LoginChallenge, LoginStatus};

/// Waiters re-check cancellation at this interval.
const WAIT_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    NoCredential,
    Pending { challenge: LoginChallenge },
    Authenticated(Credential),
    Expired,
}

/// Timing of the interactive login poll loop.
#[derive(Debug, Clone, Copy)]
pub struct LoginPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for LoginPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Whether an interactive login may be started.
    pub interactive: bool,
    pub cancel: CancelToken,
}

impl ResolveOptions {
    pub fn interactive(cancel: CancelToken) -> Self {
        Self {
            interactive: true,
            cancel,
        }
    }

    pub fn non_interactive(cancel: CancelToken) -> Self {
        Self {
            interactive: false,
            cancel,
        }
    }
}

struct Inner {
    state: AuthState,
    /// Bumped each time an interactive login finishes.
    login_round: u64,
    last_login: Option<Result<Credential, AuthError>>,
}

pub struct AuthSession {
    provider: Arc<dyn AuthProvider>,
    policy: LoginPolicy,
    inner: Mutex<Inner>,
    settled: Condvar,
}

enum Step {
    Ready(Credential),
    Expire,
    Wait,
    Acquire,
}

impl AuthSession {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self::with_policy(provider, LoginPolicy::default())
    }

    pub fn with_policy(provider: Arc<dyn AuthProvider>, policy: LoginPolicy) -> Self {
        Self {
            provider,
            policy,
            inner: Mutex::new(Inner {
                state: AuthState::NoCredential,
                login_round: 0,
                last_login: None,
            }),
            settled: Condvar::new(),
        }
    }

    /// Use `credential` for this process only. It is never persisted.
    pub fn seed(&self, credential: Credential) {
        self.lock().state = AuthState::Authenticated(credential);
    }

    pub fn state(&self) -> AuthState {
        self.lock().state.clone()
    }

    /// A usable credential: cached, then stored, then (if allowed) a new login.
    pub fn resolve(&self, opts: &ResolveOptions) -> Result<Credential, AuthError> {
        self.resolve_inner(opts, false)
    }

    /// Start an interactive login even if a stored credential exists.
    pub fn login(&self, cancel: &CancelToken) -> Result<Credential, AuthError> {
        {
            let mut inner = self.lock();
            if !matches!(inner.state, AuthState::Pending { .. }) {
                inner.state = AuthState::NoCredential;
            }
        }
        self.resolve_inner(&ResolveOptions::interactive(cancel.clone()), true)
    }

    /// Forget the cached and stored credential.
    pub fn logout(&self) -> Result<(), AuthError> {
        let mut inner = self.lock();
        if !matches!(inner.state, AuthState::Pending { .. }) {
            inner.state = AuthState::NoCredential;
        }
        self.provider.clear_credential()
    }

    /// The remote rejected `rejected`: mark the session expired and drop the
    /// stored copy if it is the same token.
    pub fn invalidate(&self, rejected: &Credential) -> Result<(), AuthError> {
        let mut inner = self.lock();
        if let AuthState::Authenticated(current) = &inner.state {
            if current.token == rejected.token {
                tracing::info!("credential rejected by remote; marking session expired");
                inner.state = AuthState::Expired;
            }
        }
        if let Some(stored) = self.provider.read_credential()? {
            if stored.token == rejected.token {
                self.provider.clear_credential()?;
            }
        }
        Ok(())
    }

    fn resolve_inner(&self, opts: &ResolveOptions, skip_store: bool) -> Result<Credential, AuthError> {
        let mut inner = self.lock();
        loop {
            if opts.cancel.is_cancelled() {
                return Err(AuthError::Cancelled);
            }
            let step = match &inner.state {
                AuthState::Authenticated(cred) if !cred.is_expired() => Step::Ready(cred.clone()),
                AuthState::Authenticated(_) => Step::Expire,
                AuthState::Pending { .. } => Step::Wait,
                AuthState::NoCredential | AuthState::Expired => Step::Acquire,
            };

            match step {
                Step::Ready(cred) => return Ok(cred),
                Step::Expire => {
                    tracing::debug!("cached credential expired");
                    inner.state = AuthState::Expired;
                }
                Step::Wait => {
                    let round = inner.login_round;
                    while inner.login_round == round {
                        if opts.cancel.is_cancelled() {
                            return Err(AuthError::Cancelled);
                        }
                        let (guard, _) = self
                            .settled
                            .wait_timeout(inner, WAIT_SLICE)
                            .unwrap_or_else(|poisoned| poisoned.into_inner());
                        inner = guard;
                    }
                    match inner.last_login.clone() {
                        // The login owner was cancelled, not us: re-evaluate.
                        Some(Err(AuthError::Cancelled)) | None => continue,
                        Some(outcome) => return outcome,
                    }
                }
                Step::Acquire => {
                    if !skip_store {
                        if let Some(stored) = self.provider.read_credential()? {
                            if !stored.is_expired() {
                                tracing::debug!("using stored credential");
                                inner.state = AuthState::Authenticated(stored.clone());
                                return Ok(stored);
                            }
                            tracing::debug!("stored credential expired");
                        }
                    }
                    if !opts.interactive {
                        return Err(AuthError::Unauthenticated);
                    }
                    let challenge = self.provider.begin_login()?;
                    inner.state = AuthState::Pending {
                        challenge: challenge.clone(),
                    };
                    drop(inner);

                    let outcome = self.run_login(&challenge, &opts.cancel);

                    let mut inner = self.lock();
                    inner.state = match &outcome {
                        Ok(cred) => AuthState::Authenticated(cred.clone()),
                        Err(AuthError::LoginDenied) | Err(AuthError::LoginTimeout(_)) => {
                            AuthState::Expired
                        }
                        Err(_) => AuthState::NoCredential,
                    };
                    inner.login_round += 1;
                    inner.last_login = Some(outcome.clone());
                    self.settled.notify_all();
                    return outcome;
                }
            }
        }
    }

    /// Poll until approval, denial, timeout or cancellation. Only an
    /// approved credential is persisted.
    fn run_login(&self, challenge: &LoginChallenge, cancel: &CancelToken) -> Result<Credential, AuthError> {
        if let Err(err) = self.provider.open_login_url(&challenge.login_url) {
            tracing::warn!("could not open login URL automatically: {err}");
        }
        let deadline = Instant::now() + self.policy.timeout;
        loop {
            if cancel.is_cancelled() {
                return Err(AuthError::Cancelled);
            }
            match self.provider.poll_login(challenge) {
                Ok(LoginStatus::Approved(cred)) => {
                    self.provider.write_credential(&cred)?;
                    tracing::info!("login approved");
                    return Ok(cred);
                }
                Ok(LoginStatus::Denied) => return Err(AuthError::LoginDenied),
                Ok(LoginStatus::Pending) => {}
                Err(err) if err.is_retryable() => {
                    tracing::warn!("login poll failed, will retry: {err}");
                }
                Err(err) => return Err(err),
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(AuthError::LoginTimeout(self.policy.timeout));
            }
            if cancel.sleep(self.policy.poll_interval.min(deadline - now)) {
                return Err(AuthError::Cancelled);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Default)]
    struct FakeProvider {
        stored: Mutex<Option<Credential>>,
        polls: Mutex<VecDeque<LoginStatus>>,
        /// Returned once `polls` is exhausted.
        fallback: Mutex<Option<LoginStatus>>,
        reads: AtomicUsize,
        logins: AtomicUsize,
        writes: AtomicUsize,
    }

    impl FakeProvider {
        fn with_stored(cred: Credential) -> Self {
            let fake = Self::default();
            *fake.stored.lock().unwrap() = Some(cred);
            fake
        }

        fn script(self, polls: Vec<LoginStatus>, fallback: LoginStatus) -> Self {
            *self.polls.lock().unwrap() = polls.into();
            *self.fallback.lock().unwrap() = Some(fallback);
            self
        }

        fn stored(&self) -> Option<Credential> {
            self.stored.lock().unwrap().clone()
        }
    }

    impl AuthProvider for FakeProvider {
        fn read_credential(&self) -> Result<Option<Credential>, AuthError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.stored())
        }

        fn write_credential(&self, credential: &Credential) -> Result<(), AuthError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            *self.stored.lock().unwrap() = Some(credential.clone());
            Ok(())
        }

        fn clear_credential(&self) -> Result<(), AuthError> {
            *self.stored.lock().unwrap() = None;
            Ok(())
        }

        fn begin_login(&self) -> Result<LoginChallenge, AuthError> {
            let n = self.logins.fetch_add(1, Ordering::SeqCst);
            Ok(LoginChallenge {
                id: format!("c{n}"),
                login_url: format!("https://remote/login/c{n}"),
            })
        }

        fn poll_login(&self, _challenge: &LoginChallenge) -> Result<LoginStatus, AuthError> {
            if let Some(next) = self.polls.lock().unwrap().pop_front() {
                return Ok(next);
            }
            Ok(self
                .fallback
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(LoginStatus::Pending))
        }

        fn open_login_url(&self, _url: &str) -> Result<(), AuthError> {
            Ok(())
        }
    }

    fn fast_policy() -> LoginPolicy {
        LoginPolicy {
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_secs(10),
        }
    }

    fn session(fake: &Arc<FakeProvider>) -> AuthSession {
        AuthSession::with_policy(fake.clone(), fast_policy())
    }

    fn expired(token: &str) -> Credential {
        Credential::new(token, Some(Utc::now() - ChronoDuration::hours(1)))
    }

    #[test]
    fn cached_credential_needs_no_provider_io() {
        let fake = Arc::new(FakeProvider::default());
        let session = session(&fake);
        session.seed(Credential::new("env-token", None));

        let cred = session
            .resolve(&ResolveOptions::non_interactive(CancelToken::new()))
            .unwrap();
        assert_eq!(cred.token, "env-token");
        assert_eq!(fake.reads.load(Ordering::SeqCst), 0);
        assert_eq!(fake.writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stored_credential_is_loaded_once_and_cached() {
        let fake = Arc::new(FakeProvider::with_stored(Credential::new("disk", None)));
        let session = session(&fake);
        let opts = ResolveOptions::non_interactive(CancelToken::new());

        assert_eq!(session.resolve(&opts).unwrap().token, "disk");
        assert_eq!(session.resolve(&opts).unwrap().token, "disk");
        assert_eq!(fake.reads.load(Ordering::SeqCst), 1);
        assert!(matches!(session.state(), AuthState::Authenticated(_)));
    }

    #[test]
    fn non_interactive_without_credential_is_unauthenticated() {
        let fake = Arc::new(FakeProvider::with_stored(expired("old")));
        let session = session(&fake);
        let err = session
            .resolve(&ResolveOptions::non_interactive(CancelToken::new()))
            .unwrap_err();
        assert_eq!(err, AuthError::Unauthenticated);
        assert_eq!(fake.logins.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn approved_login_is_persisted_and_cached() {
        let fake = Arc::new(FakeProvider::default().script(
            vec![LoginStatus::Pending, LoginStatus::Pending],
            LoginStatus::Approved(Credential::new("fresh", None)),
        ));
        let session = session(&fake);

        let cred = session
            .resolve(&ResolveOptions::interactive(CancelToken::new()))
            .unwrap();
        assert_eq!(cred.token, "fresh");
        assert_eq!(fake.stored().map(|c| c.token), Some("fresh".to_string()));
        assert_eq!(session.state(), AuthState::Authenticated(cred));
    }

    #[test]
    fn denied_login_persists_nothing() {
        let fake = Arc::new(FakeProvider::default().script(vec![], LoginStatus::Denied));
        let session = session(&fake);

        let err = session
            .resolve(&ResolveOptions::interactive(CancelToken::new()))
            .unwrap_err();
        assert_eq!(err, AuthError::LoginDenied);
        assert_eq!(fake.stored(), None);
        assert_eq!(session.state(), AuthState::Expired);
    }

    #[test]
    fn login_times_out_when_never_approved() {
        let fake = Arc::new(FakeProvider::default());
        let session = AuthSession::with_policy(
            fake.clone(),
            LoginPolicy {
                poll_interval: Duration::from_millis(5),
                timeout: Duration::from_millis(60),
            },
        );

        let err = session
            .resolve(&ResolveOptions::interactive(CancelToken::new()))
            .unwrap_err();
        assert!(matches!(err, AuthError::LoginTimeout(_)));
        assert_eq!(fake.writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cancellation_during_login_returns_to_no_credential() {
        let fake = Arc::new(FakeProvider::default());
        let session = session(&fake);
        let cancel = CancelToken::new();

        let canceller = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(40));
                cancel.cancel();
            })
        };
        let err = session
            .resolve(&ResolveOptions::interactive(cancel))
            .unwrap_err();
        canceller.join().unwrap();

        assert_eq!(err, AuthError::Cancelled);
        assert_eq!(session.state(), AuthState::NoCredential);
        assert_eq!(fake.stored(), None);
    }

    #[test]
    fn concurrent_resolves_share_one_login() {
        let fake = Arc::new(FakeProvider::default().script(
            vec![LoginStatus::Pending; 8],
            LoginStatus::Approved(Credential::new("shared", None)),
        ));
        let session = Arc::new(session(&fake));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let session = session.clone();
                thread::spawn(move || {
                    session.resolve(&ResolveOptions::interactive(CancelToken::new()))
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap().token, "shared");
        }
        assert_eq!(fake.logins.load(Ordering::SeqCst), 1);
        assert_eq!(fake.writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidate_expires_session_and_clears_matching_store() {
        let fake = Arc::new(FakeProvider::with_stored(Credential::new("tok", None)));
        let session = session(&fake);
        let opts = ResolveOptions::non_interactive(CancelToken::new());
        let cred = session.resolve(&opts).unwrap();

        session.invalidate(&cred).unwrap();
        assert_eq!(session.state(), AuthState::Expired);
        assert_eq!(fake.stored(), None);
        assert_eq!(session.resolve(&opts).unwrap_err(), AuthError::Unauthenticated);
    }

    #[test]
    fn invalidate_keeps_a_different_stored_token() {
        let fake = Arc::new(FakeProvider::with_stored(Credential::new("disk", None)));
        let session = session(&fake);
        session.seed(Credential::new("env", None));

        session.invalidate(&Credential::new("env", None)).unwrap();
        assert_eq!(fake.stored().map(|c| c.token), Some("disk".to_string()));
        let cred = session
            .resolve(&ResolveOptions::non_interactive(CancelToken::new()))
            .unwrap();
        assert_eq!(cred.token, "disk");
    }

    #[test]
    fn expired_cached_credential_falls_back_to_store() {
        let fake = Arc::new(FakeProvider::with_stored(Credential::new("disk", None)));
        let session = session(&fake);
        session.seed(expired("stale"));
        let cred = session
            .resolve(&ResolveOptions::non_interactive(CancelToken::new()))
            .unwrap();
        assert_eq!(cred.token, "disk");
    }

    #[test]
    fn explicit_login_ignores_stored_credential() {
        let fake = Arc::new(
            FakeProvider::with_stored(Credential::new("disk", None))
                .script(vec![], LoginStatus::Approved(Credential::new("new", None))),
        );
        let session = session(&fake);
        let cred = session.login(&CancelToken::new()).unwrap();
        assert_eq!(cred.token, "new");
        assert_eq!(fake.logins.load(Ordering::SeqCst), 1);
        assert_eq!(fake.stored().map(|c| c.token), Some("new".to_string()));
    }

    #[test]
    fn logout_clears_store_and_state() {
        let fake = Arc::new(FakeProvider::with_stored(Credential::new("disk", None)));
        let session = session(&fake);
        session
            .resolve(&ResolveOptions::non_interactive(CancelToken::new()))
            .unwrap();
        session.logout().unwrap();
        assert_eq!(session.state(), AuthState::NoCredential);
        assert_eq!(fake.stored(), None);
    }
}
