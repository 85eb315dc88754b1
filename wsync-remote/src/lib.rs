//! Typed access to a remote workspace.
//!
//! - [`client`]: the [`RemoteWorkspace`] trait and listing types
//! - [`http`]: [`HttpWorkspace`], the REST implementation
//! - [`memory`]: [`MemoryWorkspace`], an in-process implementation

pub mod client;
pub mod error;
pub mod http;
pub mod memory;

pub use client::{RemoteArtifact, RemoteEntry, RemoteWorkspace};
pub use error::RemoteError;
pub use http::HttpWorkspace;
pub use memory::{MemoryWorkspace, Mutation};
