//! Per-item results and the run summary.

use serde::Serialize;

use wsync_core::{ArtifactPath, Fingerprint};

use crate::planner::{ActionKind, SyncAction, Transfer};

/// Why an item was not attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A prerequisite failed, conflicted or was itself skipped.
    BlockedByDependency { on: ArtifactPath },
    /// The run's direction excluded this change.
    DirectionFiltered(Transfer),
    /// A remote secret variable held back by `skip_secrets`.
    Withheld,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Applied,
    Unchanged,
    /// Left for the operator; both sides and the base are listed.
    Conflicted {
        local: Option<Fingerprint>,
        remote: Option<Fingerprint>,
        base: Option<Fingerprint>,
    },
    Skipped(SkipReason),
    Failed(String),
}

impl Outcome {
    /// Applied or unchanged; dependents may proceed.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Applied | Outcome::Unchanged)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub path: ArtifactPath,
    /// `None` for paths rejected before planning.
    pub action: Option<ActionKind>,
    pub outcome: Outcome,
}

impl SyncResult {
    pub fn new(action: &SyncAction, outcome: Outcome) -> Self {
        Self {
            path: action.path.clone(),
            action: Some(action.action),
            outcome,
        }
    }

    /// A path kept out of the plan because its content is unusable.
    pub fn rejected(path: ArtifactPath, reason: impl Into<String>) -> Self {
        Self {
            path,
            action: None,
            outcome: Outcome::Failed(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub applied: usize,
    pub unchanged: usize,
    pub conflicted: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Aggregate status, mapped to an exit code by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Everything applied or unchanged.
    Clean,
    /// Some items conflicted or were skipped, none failed.
    Partial,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// In plan order.
    pub results: Vec<SyncResult>,
    pub cancelled: bool,
}

impl SyncReport {
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for result in &self.results {
            match result.outcome {
                Outcome::Applied => summary.applied += 1,
                Outcome::Unchanged => summary.unchanged += 1,
                Outcome::Conflicted { .. } => summary.conflicted += 1,
                Outcome::Skipped(_) => summary.skipped += 1,
                Outcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }

    /// Direction-filtered and withheld skips are expected and do not degrade
    /// the status.
    pub fn status(&self) -> RunStatus {
        let mut partial = self.cancelled;
        for result in &self.results {
            match &result.outcome {
                Outcome::Failed(_) => return RunStatus::Failed,
                Outcome::Conflicted { .. } => partial = true,
                Outcome::Skipped(SkipReason::DirectionFiltered(_) | SkipReason::Withheld) => {}
                Outcome::Skipped(_) => partial = true,
                Outcome::Applied | Outcome::Unchanged => {}
            }
        }
        if partial {
            RunStatus::Partial
        } else {
            RunStatus::Clean
        }
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &SyncResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Conflicted { .. }))
    }

    pub fn get(&self, path: &ArtifactPath) -> Option<&SyncResult> {
        self.results.iter().find(|r| &r.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::NoopReason;

    fn result(path: &str, outcome: Outcome) -> SyncResult {
        SyncResult {
            path: ArtifactPath::from(path),
            action: Some(ActionKind::Noop(NoopReason::Unchanged)),
            outcome,
        }
    }

    #[test]
    fn all_applied_is_clean() {
        let report = SyncReport {
            results: vec![
                result("a", Outcome::Applied),
                result("b", Outcome::Unchanged),
                result("c", Outcome::Skipped(SkipReason::DirectionFiltered(Transfer::Pull))),
            ],
            cancelled: false,
        };
        assert_eq!(report.status(), RunStatus::Clean);
        assert_eq!(
            report.summary(),
            Summary {
                applied: 1,
                unchanged: 1,
                skipped: 1,
                ..Summary::default()
            }
        );
    }

    #[test]
    fn conflicts_make_a_partial_run_and_failures_dominate() {
        let conflicted = Outcome::Conflicted {
            local: Some(Fingerprint::from("l")),
            remote: Some(Fingerprint::from("r")),
            base: None,
        };
        let mut report = SyncReport {
            results: vec![result("a", Outcome::Applied), result("b", conflicted)],
            cancelled: false,
        };
        assert_eq!(report.status(), RunStatus::Partial);
        assert_eq!(report.conflicts().count(), 1);

        report.results.push(result("c", Outcome::Failed("boom".into())));
        assert_eq!(report.status(), RunStatus::Failed);
    }

    #[test]
    fn cancelled_run_is_never_clean() {
        let report = SyncReport {
            results: vec![result("a", Outcome::Applied)],
            cancelled: true,
        };
        assert_eq!(report.status(), RunStatus::Partial);
    }

    #[test]
    fn rejected_paths_count_as_failures() {
        let report = SyncReport {
            results: vec![SyncResult::rejected(
                ArtifactPath::from("f/bad.flow.yaml"),
                "invalid YAML",
            )],
            cancelled: false,
        };
        assert_eq!(report.results[0].action, None);
        assert_eq!(report.summary().failed, 1);
        assert_eq!(report.status(), RunStatus::Failed);
    }
}
