pub mod auth;
pub mod context;
pub mod diff;
pub mod digest;
pub mod render;
pub mod status;
pub mod sync;
pub mod workspace;
