use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rstest::rstest;
use tempfile::TempDir;

use wsync_auth::{
    AuthError, AuthProvider, AuthSession, AuthState, LoginChallenge, LoginStatus, ResolveOptions,
};
use wsync_core::{Artifact, ArtifactPath, CancelToken, Credential, SyncSettings};
use wsync_remote::{MemoryWorkspace, Mutation, RemoteError};
use wsync_sync::{
    preview, sync, ConflictPolicy, Direction, ExecutorOptions, LocalTree, NoSchema, Outcome,
    RetryPolicy, RunStatus, SkipReason, SyncError, SyncExecutor, SyncOptions, SyncReport,
};

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoredToken {
    stored: Mutex<Option<Credential>>,
}

impl StoredToken {
    fn holding(token: &str) -> Self {
        Self {
            stored: Mutex::new(Some(Credential::new(token, None))),
        }
    }
}

impl AuthProvider for StoredToken {
    fn read_credential(&self) -> Result<Option<Credential>, AuthError> {
        Ok(self.stored.lock().unwrap().clone())
    }

    fn write_credential(&self, credential: &Credential) -> Result<(), AuthError> {
        *self.stored.lock().unwrap() = Some(credential.clone());
        Ok(())
    }

    fn clear_credential(&self) -> Result<(), AuthError> {
        *self.stored.lock().unwrap() = None;
        Ok(())
    }

    fn begin_login(&self) -> Result<LoginChallenge, AuthError> {
        Err(AuthError::Protocol("no interactive login in tests".into()))
    }

    fn poll_login(&self, _challenge: &LoginChallenge) -> Result<LoginStatus, AuthError> {
        Ok(LoginStatus::Denied)
    }

    fn open_login_url(&self, _url: &str) -> Result<(), AuthError> {
        Ok(())
    }
}

struct Fixture {
    root: TempDir,
    tree: LocalTree,
    remote: MemoryWorkspace,
    session: AuthSession,
}

impl Fixture {
    fn new() -> Self {
        Self::with_provider(StoredToken::holding("t1"))
    }

    fn with_provider(provider: StoredToken) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let root = TempDir::new().expect("root");
        let tree = LocalTree::open(root.path(), "dev", SyncSettings::default()).expect("open");
        Self {
            root,
            tree,
            remote: MemoryWorkspace::new(),
            session: AuthSession::new(Arc::new(provider)),
        }
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.root.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root.path().join(rel)).unwrap()
    }

    fn run(&self, options: ExecutorOptions) -> Result<SyncReport, SyncError> {
        sync(
            &self.tree,
            &self.remote,
            &self.session,
            &NoSchema,
            SyncOptions {
                direction: Direction::Both,
                executor: options,
            },
            &CancelToken::new(),
            |_| {},
        )
    }

    /// Plan now, let `between` change the world, then execute the stale plan.
    fn execute_stale(&self, cancel: CancelToken, between: impl FnOnce()) -> SyncReport {
        let (_, plan, credential) = preview(
            &self.tree,
            &self.remote,
            &self.session,
            Direction::Both,
            &ResolveOptions::non_interactive(CancelToken::new()),
        )
        .expect("preview");
        between();
        SyncExecutor::new(
            &self.remote,
            &self.tree,
            &self.session,
            credential,
            fast(),
            cancel,
        )
        .execute(plan, |_| {})
        .expect("execute")
    }
}

fn fast() -> ExecutorOptions {
    ExecutorOptions {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        },
        ..ExecutorOptions::default()
    }
}

fn path(p: &str) -> ArtifactPath {
    ArtifactPath::from(p)
}

fn artifact(p: &str, content: &str) -> Artifact {
    Artifact::from_content(path(p), content.to_string()).expect("artifact")
}

fn network() -> RemoteError {
    RemoteError::Network("connection reset".into())
}

const FLOW_USING_S: &str = "\
summary: uses s
value:
  modules:
    - id: a
      value:
        type: script
        path: f/s
";

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[test]
fn independent_item_applies_when_another_fails() {
    let fx = Fixture::new();
    fx.write("f/a.ts", "export function main() { return 'a' }\n");
    fx.write("f/b.ts", "export function main() { return 'b' }\n");
    fx.remote.fail_next(
        &path("f/a.ts"),
        RemoteError::Client {
            status: 400,
            message: "bad script".into(),
        },
    );

    let report = fx.run(fast()).expect("run");
    assert!(matches!(report.get(&path("f/a.ts")).unwrap().outcome, Outcome::Failed(_)));
    assert_eq!(report.get(&path("f/b.ts")).unwrap().outcome, Outcome::Applied);
    assert_eq!(report.status(), RunStatus::Failed);

    let manifest = fx.tree.manifest();
    assert!(!manifest.contains_key(&path("f/a.ts")));
    assert!(manifest.contains_key(&path("f/b.ts")));
}

#[test]
fn dependent_is_blocked_by_failed_prerequisite() {
    let fx = Fixture::new();
    fx.write("f/s.ts", "export function main() {}\n");
    fx.write("f/uses_s.flow.yaml", FLOW_USING_S);
    fx.remote.fail_next(
        &path("f/s.ts"),
        RemoteError::Client {
            status: 422,
            message: "rejected".into(),
        },
    );

    let report = fx.run(fast()).expect("run");
    assert_eq!(
        report.get(&path("f/uses_s.flow.yaml")).unwrap().outcome,
        Outcome::Skipped(SkipReason::BlockedByDependency { on: path("f/s.ts") })
    );
    assert!(fx.remote.paths().is_empty());
}

#[test]
fn dependency_is_pushed_before_dependent() {
    let fx = Fixture::new();
    fx.write("f/uses_s.flow.yaml", FLOW_USING_S);
    fx.write("f/s.ts", "export function main() {}\n");

    let report = fx.run(ExecutorOptions { workers: 8, ..fast() }).expect("run");
    assert_eq!(report.status(), RunStatus::Clean);
    assert_eq!(
        fx.remote.mutations(),
        vec![
            Mutation::Push(path("f/s.ts")),
            Mutation::Push(path("f/uses_s.flow.yaml")),
        ]
    );
}

// ---------------------------------------------------------------------------
// Retries and re-authentication
// ---------------------------------------------------------------------------

#[test]
fn transient_failures_are_retried() {
    let fx = Fixture::new();
    fx.write("f/a.ts", "export function main() {}\n");
    fx.remote.fail_next(&path("f/a.ts"), network());
    fx.remote.fail_next(
        &path("f/a.ts"),
        RemoteError::Server {
            status: 503,
            message: "busy".into(),
        },
    );

    let report = fx.run(fast()).expect("run");
    assert_eq!(report.status(), RunStatus::Clean);
    assert_eq!(fx.remote.mutations(), vec![Mutation::Push(path("f/a.ts"))]);
}

#[test]
fn retries_are_bounded() {
    let fx = Fixture::new();
    fx.write("f/a.ts", "export function main() {}\n");
    for _ in 0..3 {
        fx.remote.fail_next(&path("f/a.ts"), network());
    }

    let report = fx.run(fast()).expect("run");
    assert!(matches!(report.results[0].outcome, Outcome::Failed(ref reason) if reason.contains("network")));
    assert!(fx.remote.paths().is_empty());
}

#[test]
fn rejected_credential_is_re_resolved_once() {
    let fx = Fixture::new();
    fx.session.seed(Credential::new("stale", None));
    fx.write("f/a.ts", "export function main() {}\n");
    fx.remote
        .fail_next(&path("f/a.ts"), RemoteError::Unauthorized { status: 401 });

    let report = fx.run(fast()).expect("run");
    assert_eq!(report.status(), RunStatus::Clean);
    assert!(matches!(fx.session.state(), AuthState::Authenticated(c) if c.token == "t1"));
}

#[test]
fn failed_re_authentication_aborts_the_run() {
    let fx = Fixture::new();
    fx.write("f/a.ts", "export function main() {}\n");
    fx.remote
        .fail_next(&path("f/a.ts"), RemoteError::Unauthorized { status: 401 });

    let err = fx.run(fast()).unwrap_err();
    assert!(matches!(err, SyncError::Auth(AuthError::Unauthenticated)));
    assert!(fx.tree.manifest().is_empty());
}

// ---------------------------------------------------------------------------
// Stale plans and cancellation
// ---------------------------------------------------------------------------

#[test]
fn remote_change_after_planning_becomes_a_conflict() {
    let fx = Fixture::new();
    fx.write("f/a.ts", "base\n");
    fx.run(fast()).expect("first run");
    fx.write("f/a.ts", "local\n");

    let report = fx.execute_stale(CancelToken::new(), || {
        fx.remote.insert(artifact("f/a.ts", "remote\n")).unwrap();
    });
    assert!(matches!(report.results[0].outcome, Outcome::Conflicted { .. }));
    assert_eq!(fx.remote.get(&path("f/a.ts")).unwrap().content, "remote\n");
    assert_eq!(fx.read("f/a.ts"), "local\n");
}

#[test]
fn local_edit_after_planning_fails_the_item() {
    let fx = Fixture::new();
    fx.write("f/a.ts", "first\n");

    let report = fx.execute_stale(CancelToken::new(), || fx.write("f/a.ts", "second\n"));
    assert!(matches!(
        report.results[0].outcome,
        Outcome::Failed(ref reason) if reason.contains("changed locally")
    ));
    assert!(fx.remote.paths().is_empty());
    assert!(fx.tree.manifest().is_empty());
}

#[test]
fn cancelled_run_applies_nothing() {
    let fx = Fixture::new();
    fx.write("f/a.ts", "export function main() {}\n");
    fx.write("f/b.ts", "export function main() {}\n");
    let cancel = CancelToken::new();

    let report = fx.execute_stale(cancel.clone(), || cancel.cancel());
    assert!(report.cancelled);
    assert_eq!(report.status(), RunStatus::Partial);
    assert!(report
        .results
        .iter()
        .all(|r| r.outcome == Outcome::Skipped(SkipReason::Cancelled)));
    assert!(fx.remote.mutations().is_empty());
    assert!(fx.tree.manifest().is_empty());
}

#[test]
fn dependents_of_cancelled_items_report_cancellation() {
    let fx = Fixture::new();
    fx.write("f/s.ts", "export function main() {}\n");
    fx.write("f/uses_s.flow.yaml", FLOW_USING_S);
    let cancel = CancelToken::new();

    let report = fx.execute_stale(cancel.clone(), || cancel.cancel());
    assert_eq!(
        report.get(&path("f/s.ts")).unwrap().outcome,
        Outcome::Skipped(SkipReason::Cancelled)
    );
    assert_eq!(
        report.get(&path("f/uses_s.flow.yaml")).unwrap().outcome,
        Outcome::Skipped(SkipReason::Cancelled)
    );
    assert!(fx.remote.mutations().is_empty());
}

// ---------------------------------------------------------------------------
// Conflict policies
// ---------------------------------------------------------------------------

#[rstest]
#[case::skip(ConflictPolicy::Skip, "local\n", "remote\n", RunStatus::Partial)]
#[case::prefer_local(ConflictPolicy::PreferLocal, "local\n", "local\n", RunStatus::Clean)]
#[case::prefer_remote(ConflictPolicy::PreferRemote, "remote\n", "remote\n", RunStatus::Clean)]
fn conflict_policy_decides_the_winner(
    #[case] policy: ConflictPolicy,
    #[case] local_after: &str,
    #[case] remote_after: &str,
    #[case] status: RunStatus,
) {
    let fx = Fixture::new();
    fx.write("f/a.ts", "base\n");
    fx.run(fast()).expect("first run");
    fx.write("f/a.ts", "local\n");
    fx.remote.insert(artifact("f/a.ts", "remote\n")).unwrap();

    let report = fx
        .run(ExecutorOptions {
            conflict_policy: policy,
            ..fast()
        })
        .expect("run");
    assert_eq!(report.status(), status);
    assert_eq!(fx.read("f/a.ts"), local_after);
    assert_eq!(fx.remote.get(&path("f/a.ts")).unwrap().content, remote_after);
}

#[test]
fn prefer_remote_applies_a_remote_deletion() {
    let fx = Fixture::new();
    fx.write("f/a.ts", "base\n");
    fx.run(fast()).expect("first run");
    fx.write("f/a.ts", "local\n");
    fx.remote.remove(&path("f/a.ts"));

    let report = fx
        .run(ExecutorOptions {
            conflict_policy: ConflictPolicy::PreferRemote,
            ..fast()
        })
        .expect("run");
    assert_eq!(report.status(), RunStatus::Clean);
    assert!(!fx.root.path().join("f/a.ts").exists());
    assert!(fx.tree.manifest().is_empty());
}
