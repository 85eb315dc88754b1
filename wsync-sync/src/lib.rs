//! # wsync-sync
//!
//! Directory-to-workspace reconciliation.
//!
//! Call [`pipeline::sync`] to plan and apply one run, or [`pipeline::preview`]
//! to plan without touching either side. The pieces are usable on their own:
//! [`LocalTree`] owns the sync root and its manifest, [`planner::plan`] diffs
//! three inventories into a [`SyncPlan`], and [`SyncExecutor`] applies it.

pub mod diff;
pub mod error;
pub mod executor;
pub mod local_tree;
pub mod manifest;
pub mod pipeline;
pub mod planner;
pub mod report;
pub mod schema;

pub use diff::{diff_plan, ArtifactDiff};
pub use error::{ManifestError, SyncError};
pub use executor::{ConflictPolicy, ExecutorOptions, RetryPolicy, SyncExecutor};
pub use local_tree::{LocalArtifact, LocalListing, LocalTree};
pub use pipeline::{gather, preview, sync, Inventory, SyncOptions};
pub use planner::{
    plan, ActionKind, ConflictKind, Direction, NoopReason, Phase, SyncAction, SyncPlan, Transfer,
};
pub use report::{Outcome, RunStatus, SkipReason, Summary, SyncReport, SyncResult};
pub use schema::{NoSchema, SchemaInferrer};
