use async_trait::async_trait;
use gitfleet::core::actions::FolderRenameHandler;
use gitfleet::core::confirm::{ConfirmationCascade, ConfirmationResult, Prompter};
use gitfleet::core::git::{GitOutput, GitRunner};
use gitfleet::core::operations::{RuntimeOptions, TaskDefinition};
use gitfleet::core::runtime::{
    execute_tasks, ActionContext, ActionHandler, ActionOutcome, ActionRegistry, Event, EventKind,
    EventLevel, MemoryEventSink, RepositoryDiscoverer, RepositoryStatus, RuntimeDeps,
    WorktreeInspector, WorktreeStatus,
};
use gitfleet::core::{AppError, ErrorCategory};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

type CallLog = Arc<Mutex<Vec<(PathBuf, &'static str)>>>;

struct FixedDiscoverer {
    repositories: Vec<PathBuf>,
}

#[async_trait]
impl RepositoryDiscoverer for FixedDiscoverer {
    async fn discover(
        &self,
        _roots: &[PathBuf],
        _include_nested: bool,
    ) -> Result<Vec<PathBuf>, AppError> {
        Ok(self.repositories.clone())
    }
}

struct BrokenDiscoverer;

#[async_trait]
impl RepositoryDiscoverer for BrokenDiscoverer {
    async fn discover(
        &self,
        _roots: &[PathBuf],
        _include_nested: bool,
    ) -> Result<Vec<PathBuf>, AppError> {
        Err(AppError::new(ErrorCategory::DiscoveryError, "root vanished"))
    }
}

/// Repositories are clean on `main` unless marked dirty.
#[derive(Default)]
struct FakeInspector {
    dirty: Mutex<HashMap<PathBuf, bool>>,
}

impl FakeInspector {
    fn mark_dirty(&self, repository: &Path) {
        self.dirty
            .lock()
            .unwrap()
            .insert(repository.to_path_buf(), true);
    }
}

#[async_trait]
impl WorktreeInspector for FakeInspector {
    async fn status(&self, repository: &Path) -> Result<WorktreeStatus, AppError> {
        let dirty = self
            .dirty
            .lock()
            .unwrap()
            .get(repository)
            .copied()
            .unwrap_or(false);
        Ok(WorktreeStatus {
            clean: !dirty,
            branch: Some("main".to_string()),
        })
    }
}

/// Records each call; fails for repositories listed in `fail_for`.
struct Recorder {
    action_type: &'static str,
    mutates: bool,
    fail_for: Vec<PathBuf>,
    log: CallLog,
    finalized: Arc<AtomicUsize>,
}

impl Recorder {
    fn new(action_type: &'static str, log: &CallLog) -> Self {
        Self {
            action_type,
            mutates: true,
            fail_for: Vec::new(),
            log: log.clone(),
            finalized: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing_for(mut self, repository: &str) -> Self {
        self.fail_for.push(PathBuf::from(repository));
        self
    }

    fn read_only(mut self) -> Self {
        self.mutates = false;
        self
    }
}

#[async_trait]
impl ActionHandler for Recorder {
    fn action_type(&self) -> &'static str {
        self.action_type
    }

    fn mutates(&self) -> bool {
        self.mutates
    }

    async fn execute(
        &self,
        _options: &Map<String, Value>,
        ctx: &ActionContext,
    ) -> Result<ActionOutcome, AppError> {
        self.log
            .lock()
            .unwrap()
            .push((ctx.repository.clone(), self.action_type));
        if self.fail_for.contains(&ctx.repository) {
            return Err(AppError::new(ErrorCategory::ActionError, "simulated failure"));
        }
        if ctx.dry_run {
            return Ok(ActionOutcome::planned("would record"));
        }
        Ok(ActionOutcome::applied("recorded"))
    }

    async fn finalize(&self) -> Result<Vec<Event>, AppError> {
        self.finalized.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Event::info("recorder flushed")])
    }
}

/// Leaves the worktree dirty, like a task that edits files without committing.
struct Dirtier {
    inspector: Arc<FakeInspector>,
}

#[async_trait]
impl ActionHandler for Dirtier {
    fn action_type(&self) -> &'static str {
        "test.dirty"
    }

    async fn execute(
        &self,
        _options: &Map<String, Value>,
        ctx: &ActionContext,
    ) -> Result<ActionOutcome, AppError> {
        self.inspector.mark_dirty(&ctx.repository);
        Ok(ActionOutcome::applied("edited files"))
    }
}

struct ScriptedPrompter {
    answer: ConfirmationResult,
    asked: Arc<AtomicUsize>,
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    fn prompter_type(&self) -> &'static str {
        "scripted"
    }

    async fn confirm(&self, _prompt: &str) -> Result<ConfirmationResult, AppError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer)
    }
}

fn paths(raw: &[&str]) -> Vec<PathBuf> {
    raw.iter().map(PathBuf::from).collect()
}

fn task(name: &str, action_types: &[&str]) -> TaskDefinition {
    action_types
        .iter()
        .fold(TaskDefinition::new(name), |task, action| {
            task.with_action(action, Map::new())
        })
}

struct Harness {
    deps: RuntimeDeps,
    sink: Arc<MemoryEventSink>,
}

fn harness(
    repositories: &[&str],
    handlers: Vec<Arc<dyn ActionHandler>>,
    inspector: Arc<FakeInspector>,
    cascade: ConfirmationCascade,
) -> Harness {
    let mut builder = ActionRegistry::builder();
    for handler in handlers {
        builder.register_arc(handler);
    }
    let sink = Arc::new(MemoryEventSink::new());
    Harness {
        deps: RuntimeDeps {
            discoverer: Arc::new(FixedDiscoverer {
                repositories: paths(repositories),
            }),
            inspector,
            registry: builder.build(),
            cascade: Arc::new(cascade),
            sink: sink.clone(),
        },
        sink,
    }
}

fn sequential() -> RuntimeOptions {
    RuntimeOptions {
        workflow_parallelism: 1,
        ..RuntimeOptions::default()
    }
}

fn calls(log: &CallLog) -> Vec<(PathBuf, &'static str)> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn test_tasks_run_in_plan_order_for_every_repository() {
    let log = CallLog::default();
    let h = harness(
        &["/fleet/b", "/fleet/a"],
        vec![
            Arc::new(Recorder::new("test.first", &log)),
            Arc::new(Recorder::new("test.second", &log)),
        ],
        Arc::new(FakeInspector::default()),
        ConfirmationCascade::assume_yes_always(),
    );

    let tasks = vec![task("one", &["test.first"]), task("two", &["test.second"])];
    let outcome = execute_tasks(&[], &tasks, &sequential(), &h.deps, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        calls(&log),
        vec![
            (PathBuf::from("/fleet/a"), "test.first"),
            (PathBuf::from("/fleet/a"), "test.second"),
            (PathBuf::from("/fleet/b"), "test.first"),
            (PathBuf::from("/fleet/b"), "test.second"),
        ]
    );
    assert_eq!(outcome.repository_count, 2);
    assert_eq!(outcome.summary.succeeded_repositories, 2);
    assert_eq!(outcome.summary.applied_actions, 4);
    assert_eq!(outcome.stage_outcomes.len(), 2);
    assert_eq!(outcome.stage_outcomes[0].name, "one");
    assert_eq!(outcome.stage_outcomes[0].applied, 2);
    assert!(!outcome.has_failures());
    assert_eq!(h.sink.of_kind(EventKind::Apply).len(), 4);
}

#[tokio::test]
async fn test_fail_fast_aborts_only_the_failing_repository() {
    let log = CallLog::default();
    let h = harness(
        &["/fleet/bad", "/fleet/good"],
        vec![
            Arc::new(Recorder::new("test.fail", &log).failing_for("/fleet/bad")),
            Arc::new(Recorder::new("test.after", &log)),
        ],
        Arc::new(FakeInspector::default()),
        ConfirmationCascade::assume_yes_always(),
    );
    let tasks = vec![task("break", &["test.fail"]), task("after", &["test.after"])];

    let outcome = execute_tasks(&[], &tasks, &sequential(), &h.deps, CancellationToken::new())
        .await
        .unwrap();

    let recorded = calls(&log);
    assert!(!recorded.contains(&(PathBuf::from("/fleet/bad"), "test.after")));
    assert!(recorded.contains(&(PathBuf::from("/fleet/good"), "test.after")));

    assert!(outcome.has_failures());
    assert_eq!(outcome.summary.failed_repositories, 1);
    assert_eq!(outcome.summary.succeeded_repositories, 1);
    let bad = &outcome.repositories[0];
    assert_eq!(bad.path, PathBuf::from("/fleet/bad"));
    assert_eq!(bad.status, RepositoryStatus::Failed);
    assert!(bad.error.as_deref().unwrap().starts_with("break: "));

    let errors: Vec<_> = h
        .sink
        .events()
        .into_iter()
        .filter(|event| event.level == EventLevel::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].action.as_deref(), Some("test.fail"));
    assert_eq!(outcome.summary.error_events, 1);
}

#[tokio::test]
async fn test_continue_on_error_runs_remaining_tasks() {
    let log = CallLog::default();
    let h = harness(
        &["/fleet/bad"],
        vec![
            Arc::new(Recorder::new("test.fail", &log).failing_for("/fleet/bad")),
            Arc::new(Recorder::new("test.after", &log)),
        ],
        Arc::new(FakeInspector::default()),
        ConfirmationCascade::assume_yes_always(),
    );
    let tasks = vec![task("break", &["test.fail"]), task("after", &["test.after"])];
    let options = RuntimeOptions {
        fail_fast: false,
        ..sequential()
    };

    let outcome = execute_tasks(&[], &tasks, &options, &h.deps, CancellationToken::new())
        .await
        .unwrap();

    assert!(calls(&log).contains(&(PathBuf::from("/fleet/bad"), "test.after")));
    let bad = &outcome.repositories[0];
    assert_eq!(bad.status, RepositoryStatus::Failed);
    assert_eq!(bad.applied, 1);
    assert_eq!(bad.failed, 1);
}

#[tokio::test]
async fn test_descending_depth_visits_nested_repositories_first() {
    let log = CallLog::default();
    let h = harness(
        &["/fleet/a", "/fleet/a/b/c", "/fleet/z", "/fleet/a/b"],
        vec![Arc::new(Recorder::new("test.record", &log))],
        Arc::new(FakeInspector::default()),
        ConfirmationCascade::assume_yes_always(),
    );
    let options = RuntimeOptions {
        process_repositories_by_descending_depth: true,
        workflow_parallelism: 4,
        ..RuntimeOptions::default()
    };

    execute_tasks(
        &[],
        &[task("rename", &["test.record"])],
        &options,
        &h.deps,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let order: Vec<PathBuf> = calls(&log).into_iter().map(|(path, _)| path).collect();
    assert_eq!(order[0], PathBuf::from("/fleet/a/b/c"));
    assert_eq!(order[1], PathBuf::from("/fleet/a/b"));
    // the two shallow repositories share a wave, so only their set is fixed
    let mut shallow = order[2..].to_vec();
    shallow.sort();
    assert_eq!(shallow, paths(&["/fleet/a", "/fleet/z"]));
}

#[tokio::test]
async fn test_clean_check_uses_initial_snapshot_when_captured() {
    let log = CallLog::default();
    let inspector = Arc::new(FakeInspector::default());
    let handlers: Vec<Arc<dyn ActionHandler>> = vec![
        Arc::new(Dirtier {
            inspector: inspector.clone(),
        }),
        Arc::new(Recorder::new("test.record", &log)),
    ];
    let h = harness(
        &["/fleet/app"],
        handlers,
        inspector,
        ConfirmationCascade::assume_yes_always(),
    );
    let tasks = vec![
        task("edit", &["test.dirty"]),
        task("rename", &["test.record"]).with_ensure_clean(true),
    ];

    let options = RuntimeOptions {
        capture_initial_worktree_status: true,
        ..sequential()
    };
    let outcome = execute_tasks(&[], &tasks, &options, &h.deps, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(calls(&log).len(), 1);
    assert_eq!(outcome.repositories[0].applied, 2);
}

#[tokio::test]
async fn test_clean_check_is_live_without_snapshot() {
    let log = CallLog::default();
    let inspector = Arc::new(FakeInspector::default());
    let handlers: Vec<Arc<dyn ActionHandler>> = vec![
        Arc::new(Dirtier {
            inspector: inspector.clone(),
        }),
        Arc::new(Recorder::new("test.record", &log)),
    ];
    let h = harness(
        &["/fleet/app"],
        handlers,
        inspector,
        ConfirmationCascade::assume_yes_always(),
    );
    let tasks = vec![
        task("edit", &["test.dirty"]),
        task("rename", &["test.record"]).with_ensure_clean(true),
    ];

    let outcome = execute_tasks(&[], &tasks, &sequential(), &h.deps, CancellationToken::new())
        .await
        .unwrap();

    assert!(calls(&log).is_empty());
    let skips = h.sink.of_kind(EventKind::Skip);
    assert_eq!(skips.len(), 1);
    assert_eq!(skips[0].level, EventLevel::Warn);
    assert_eq!(skips[0].task.as_deref(), Some("rename"));
    assert_eq!(outcome.repositories[0].skipped, 1);
    assert!(!outcome.has_failures());
}

#[tokio::test]
async fn test_declined_confirmation_skips_without_failing() {
    let log = CallLog::default();
    let asked = Arc::new(AtomicUsize::new(0));
    let prompter = ScriptedPrompter {
        answer: ConfirmationResult::no(),
        asked: asked.clone(),
    };
    let h = harness(
        &["/fleet/a", "/fleet/b"],
        vec![Arc::new(Recorder::new("test.record", &log))],
        Arc::new(FakeInspector::default()),
        ConfirmationCascade::new(Some(Arc::new(prompter)), false),
    );

    let outcome = execute_tasks(
        &[],
        &[task("update", &["test.record"])],
        &sequential(),
        &h.deps,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(asked.load(Ordering::SeqCst), 2);
    assert!(calls(&log).is_empty());
    assert!(!outcome.has_failures());
    assert_eq!(outcome.summary.skipped_repositories, 2);
    let skips = h.sink.of_kind(EventKind::Skip);
    assert!(skips
        .iter()
        .all(|event| event.level == EventLevel::Info && event.message == "declined by user"));
}

#[tokio::test]
async fn test_apply_to_all_answers_every_later_prompt() {
    let log = CallLog::default();
    let asked = Arc::new(AtomicUsize::new(0));
    let prompter = ScriptedPrompter {
        answer: ConfirmationResult::all(),
        asked: asked.clone(),
    };
    let h = harness(
        &["/fleet/a", "/fleet/b", "/fleet/c"],
        vec![Arc::new(Recorder::new("test.record", &log))],
        Arc::new(FakeInspector::default()),
        ConfirmationCascade::new(Some(Arc::new(prompter)), false),
    );

    execute_tasks(
        &[],
        &[task("update", &["test.record"])],
        &sequential(),
        &h.deps,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert_eq!(calls(&log).len(), 3);
}

#[tokio::test]
async fn test_read_only_and_dry_run_work_is_never_confirmed() {
    let log = CallLog::default();
    let asked = Arc::new(AtomicUsize::new(0));
    let prompter = ScriptedPrompter {
        answer: ConfirmationResult::no(),
        asked: asked.clone(),
    };
    let h = harness(
        &["/fleet/a"],
        vec![
            Arc::new(Recorder::new("test.audit", &log).read_only()),
            Arc::new(Recorder::new("test.record", &log)),
        ],
        Arc::new(FakeInspector::default()),
        ConfirmationCascade::new(Some(Arc::new(prompter)), false),
    );

    let tasks = vec![task("audit", &["test.audit"]), task("update", &["test.record"])];
    let options = RuntimeOptions {
        dry_run: true,
        ..sequential()
    };
    let outcome = execute_tasks(&[], &tasks, &options, &h.deps, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(asked.load(Ordering::SeqCst), 0);
    assert_eq!(calls(&log).len(), 2);
    assert_eq!(h.sink.of_kind(EventKind::Plan).len(), 2);
    assert_eq!(outcome.summary.applied_actions, 2);
}

#[tokio::test]
async fn test_cancellation_before_start_processes_nothing() {
    let log = CallLog::default();
    let recorder = Recorder::new("test.record", &log);
    let finalized = recorder.finalized.clone();
    let h = harness(
        &["/fleet/a", "/fleet/b"],
        vec![Arc::new(recorder)],
        Arc::new(FakeInspector::default()),
        ConfirmationCascade::assume_yes_always(),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = execute_tasks(
        &[],
        &[task("update", &["test.record"])],
        &sequential(),
        &h.deps,
        cancel,
    )
    .await
    .unwrap();

    assert!(outcome.cancelled);
    assert!(outcome.repositories.is_empty());
    assert_eq!(outcome.repository_count, 2);
    assert!(calls(&log).is_empty());
    assert_eq!(finalized.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_finalize_runs_once_per_handler() {
    let log = CallLog::default();
    let recorder = Recorder::new("test.record", &log);
    let finalized = recorder.finalized.clone();
    let h = harness(
        &["/fleet/a", "/fleet/b"],
        vec![Arc::new(recorder)],
        Arc::new(FakeInspector::default()),
        ConfirmationCascade::assume_yes_always(),
    );
    let tasks = vec![
        task("first", &["test.record"]),
        task("second", &["test.record"]),
    ];

    execute_tasks(&[], &tasks, &sequential(), &h.deps, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(finalized.load(Ordering::SeqCst), 1);
    let flushed: Vec<_> = h
        .sink
        .events()
        .into_iter()
        .filter(|event| event.message == "recorder flushed")
        .collect();
    assert_eq!(flushed.len(), 1);
    assert_eq!(flushed[0].action.as_deref(), Some("test.record"));
}

#[tokio::test]
async fn test_preflight_rejects_unknown_action_before_discovery() {
    let h = harness(
        &["/fleet/a"],
        Vec::new(),
        Arc::new(FakeInspector::default()),
        ConfirmationCascade::assume_yes_always(),
    );

    let err = execute_tasks(
        &[],
        &[task("mystery", &["test.missing"])],
        &sequential(),
        &h.deps,
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.code, "RUN-ACTION-001");
    assert!(h.sink.events().is_empty());
}

#[tokio::test]
async fn test_discovery_failure_is_fatal() {
    let log = CallLog::default();
    let mut h = harness(
        &[],
        vec![Arc::new(Recorder::new("test.record", &log))],
        Arc::new(FakeInspector::default()),
        ConfirmationCascade::assume_yes_always(),
    );
    h.deps.discoverer = Arc::new(BrokenDiscoverer);

    let err = execute_tasks(
        &paths(&["/missing"]),
        &[task("update", &["test.record"])],
        &sequential(),
        &h.deps,
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.code, "RUN-DISCOVER-001");
    assert_eq!(err.context.get("roots").map(String::as_str), Some("/missing"));
}

/// Answers `remote get-url origin` with a fixed URL; every other command succeeds silently.
struct OriginOnlyGit {
    origin: &'static str,
}

#[async_trait]
impl GitRunner for OriginOnlyGit {
    async fn run(&self, _repository: &Path, args: &[String]) -> Result<GitOutput, AppError> {
        let stdout = if args.join(" ") == "remote get-url origin" {
            self.origin.to_string()
        } else {
            String::new()
        };
        Ok(GitOutput {
            exit_code: 0,
            stdout,
            stderr: String::new(),
        })
    }
}

#[tokio::test]
async fn test_tasks_after_rename_run_in_the_new_directory() {
    let temp = TempDir::new().unwrap();
    let old = temp.path().join("old-name");
    let renamed = temp.path().join("widgets");
    std::fs::create_dir_all(old.join(".git")).unwrap();

    let log = CallLog::default();
    let old_str = old.display().to_string();
    let h = harness(
        &[old_str.as_str()],
        vec![
            Arc::new(FolderRenameHandler::new(Arc::new(OriginOnlyGit {
                origin: "git@github.com:acme/widgets.git",
            }))),
            Arc::new(Recorder::new("test.record", &log)),
        ],
        Arc::new(FakeInspector::default()),
        ConfirmationCascade::assume_yes_always(),
    );

    let tasks = vec![
        task("rename directories", &["repo.folder.rename"]),
        task("audit", &["test.record"]),
    ];
    let outcome = execute_tasks(&[], &tasks, &sequential(), &h.deps, CancellationToken::new())
        .await
        .unwrap();

    assert!(renamed.join(".git").is_dir());
    assert!(!old.exists());
    assert_eq!(calls(&log), vec![(renamed.clone(), "test.record")]);
    assert!(!outcome.has_failures());
    let repository = &outcome.repositories[0];
    assert_eq!(repository.path, old);
    assert_eq!(repository.relocated_to, Some(renamed.clone()));
    assert_eq!(repository.applied, 2);
    let audit_events = h.sink.of_kind(EventKind::Apply);
    assert_eq!(audit_events.len(), 2);
    assert_eq!(audit_events[1].repository.as_deref(), Some(renamed.as_path()));
}

#[tokio::test]
async fn test_assume_yes_option_skips_confirmation() {
    let log = CallLog::default();
    let asked = Arc::new(AtomicUsize::new(0));
    let prompter = ScriptedPrompter {
        answer: ConfirmationResult::no(),
        asked: asked.clone(),
    };
    let h = harness(
        &["/fleet/a", "/fleet/b"],
        vec![Arc::new(Recorder::new("test.record", &log))],
        Arc::new(FakeInspector::default()),
        ConfirmationCascade::new(Some(Arc::new(prompter)), false),
    );
    let options = RuntimeOptions {
        assume_yes: true,
        ..sequential()
    };

    let outcome = execute_tasks(
        &[],
        &[task("update", &["test.record"])],
        &options,
        &h.deps,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(asked.load(Ordering::SeqCst), 0);
    assert_eq!(calls(&log).len(), 2);
    assert_eq!(outcome.summary.succeeded_repositories, 2);
}

/// Sleeps per repository and tracks how many repositories run at once.
struct Sleeper {
    delays: HashMap<PathBuf, u64>,
    fail_for: PathBuf,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl ActionHandler for Sleeper {
    fn action_type(&self) -> &'static str {
        "test.sleep"
    }

    async fn execute(
        &self,
        _options: &Map<String, Value>,
        ctx: &ActionContext,
    ) -> Result<ActionOutcome, AppError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let delay = self.delays.get(&ctx.repository).copied().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if ctx.repository == self.fail_for {
            return Err(AppError::new(ErrorCategory::ActionError, "simulated failure"));
        }
        Ok(ActionOutcome::applied("slept"))
    }
}

async fn run_staggered(delays_ms: [u64; 4]) -> (gitfleet::core::runtime::ExecutionOutcome, usize) {
    let repositories = ["/fleet/a", "/fleet/b", "/fleet/c", "/fleet/d"];
    let peak = Arc::new(AtomicUsize::new(0));
    let sleeper = Sleeper {
        delays: repositories
            .iter()
            .map(PathBuf::from)
            .zip(delays_ms)
            .collect(),
        fail_for: PathBuf::from("/fleet/c"),
        in_flight: Arc::new(AtomicUsize::new(0)),
        peak: peak.clone(),
    };
    let h = harness(
        &repositories,
        vec![Arc::new(sleeper)],
        Arc::new(FakeInspector::default()),
        ConfirmationCascade::assume_yes_always(),
    );
    let options = RuntimeOptions {
        workflow_parallelism: 2,
        ..RuntimeOptions::default()
    };
    let outcome = execute_tasks(
        &[],
        &[task("sleep", &["test.sleep"])],
        &options,
        &h.deps,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    (outcome, peak.load(Ordering::SeqCst))
}

#[tokio::test]
async fn test_parallel_outcome_is_independent_of_completion_order() {
    let (forward, forward_peak) = run_staggered([40, 30, 20, 10]).await;
    let (reverse, reverse_peak) = run_staggered([10, 20, 30, 40]).await;

    assert_eq!(forward_peak, 2);
    assert_eq!(reverse_peak, 2);

    let order: Vec<PathBuf> = forward.repositories.iter().map(|r| r.path.clone()).collect();
    assert_eq!(order, paths(&["/fleet/a", "/fleet/b", "/fleet/c", "/fleet/d"]));
    assert_eq!(forward.repositories, reverse.repositories);
    assert_eq!(forward.stage_outcomes, reverse.stage_outcomes);
    assert_eq!(forward.summary, reverse.summary);

    assert_eq!(forward.stage_outcomes[0].applied, 3);
    assert_eq!(forward.stage_outcomes[0].failed, 1);
    assert_eq!(forward.summary.succeeded_repositories, 3);
    assert_eq!(forward.summary.failed_repositories, 1);
    assert_eq!(forward.repositories[2].status, RepositoryStatus::Failed);
}

/// Clean inspector that sleeps and records peak concurrent status calls.
#[derive(Default)]
struct CountingInspector {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl WorktreeInspector for CountingInspector {
    async fn status(&self, _repository: &Path) -> Result<WorktreeStatus, AppError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(WorktreeStatus {
            clean: true,
            branch: Some("main".to_string()),
        })
    }
}

#[tokio::test]
async fn test_initial_snapshot_respects_parallelism() {
    let log = CallLog::default();
    let inspector = Arc::new(CountingInspector::default());
    let mut builder = ActionRegistry::builder();
    builder.register(Recorder::new("test.record", &log).read_only());
    let deps = RuntimeDeps {
        discoverer: Arc::new(FixedDiscoverer {
            repositories: paths(&["/fleet/a", "/fleet/b", "/fleet/c", "/fleet/d", "/fleet/e"]),
        }),
        inspector: inspector.clone(),
        registry: builder.build(),
        cascade: Arc::new(ConfirmationCascade::assume_yes_always()),
        sink: Arc::new(MemoryEventSink::new()),
    };
    let options = RuntimeOptions {
        workflow_parallelism: 2,
        capture_initial_worktree_status: true,
        ..RuntimeOptions::default()
    };

    let outcome = execute_tasks(
        &[],
        &[task("record", &["test.record"])],
        &options,
        &deps,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.repository_count, 5);
    assert_eq!(inspector.peak.load(Ordering::SeqCst), 2);
}
