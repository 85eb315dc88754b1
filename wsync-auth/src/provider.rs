//! The collaborator an [`AuthSession`](crate::AuthSession) drives.

use wsync_core::Credential;

use crate::error::AuthError;

/// An out-of-band login request awaiting approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginChallenge {
    pub id: String,
    /// URL the user opens (usually in a browser) to approve the login.
    pub login_url: String,
}

/// Result of one poll of the login status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStatus {
    Pending,
    Approved(Credential),
    Denied,
}

/// Credential storage plus the interactive login endpoints.
pub trait AuthProvider: Send + Sync {
    fn read_credential(&self) -> Result<Option<Credential>, AuthError>;

    fn write_credential(&self, credential: &Credential) -> Result<(), AuthError>;

    fn clear_credential(&self) -> Result<(), AuthError>;

    fn begin_login(&self) -> Result<LoginChallenge, AuthError>;

    fn poll_login(&self, challenge: &LoginChallenge) -> Result<LoginStatus, AuthError>;

    /// Present the login URL to the user. Failure is logged, never fatal.
    fn open_login_url(&self, url: &str) -> Result<(), AuthError>;
}
