//! Authentication for the remote workspace API.
//!
//! - [`session`]: [`AuthSession`], the per-profile credential state machine
//! - [`provider`]: [`AuthProvider`], storage plus login endpoints
//! - [`store`]: credential files under `~/.wsync/credentials/`
//! - [`http`]: the HTTP login flow

pub mod error;
pub mod http;
pub mod provider;
pub mod session;
pub mod store;

pub use error::AuthError;
pub use http::HttpAuthProvider;
pub use provider::{AuthProvider, LoginChallenge, LoginStatus};
pub use session::{AuthSession, AuthState, LoginPolicy, ResolveOptions};
pub use store::FileCredentialStore;

/// Environment variable holding a token that bypasses stored credentials.
pub const TOKEN_ENV: &str = "WSYNC_TOKEN";
