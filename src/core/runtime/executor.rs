#![allow(clippy::result_large_err)] // Runtime entry points return AppError so preflight failures keep their codes.

//! Runs translated tasks against every discovered repository.
//!
//! Repositories run concurrently up to the configured parallelism; tasks inside a
//! repository always run in plan order. Failures are isolated per repository and
//! only preflight problems (unknown actions, invalid options, discovery) fail the
//! whole run.

use crate::core::confirm::ConfirmationCascade;
use crate::core::error::AppError;
use crate::core::operations::schema::OperationNode;
use crate::core::operations::task::{action_types, RuntimeOptions, TaskDefinition};
use crate::core::operations::translate::compile_plan;
use crate::core::runtime::action::{ActionContext, ActionHandler, ActionRegistry, ActionStatus};
use crate::core::runtime::discovery::{depth_waves, RepositoryDiscoverer};
use crate::core::runtime::events::{Event, EventLevel, EventSink};
use crate::core::runtime::outcome::{
    ExecutionOutcome, RepositoryOutcome, RepositoryStatus, StageOutcome, SummaryData,
};
use crate::core::runtime::worktree::{WorktreeInspector, WorktreeStatus};
use crate::core::types::ErrorCategory;
use futures::stream::{self, FuturesUnordered};
use futures::StreamExt;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Collaborators the runtime drives. All are replaceable in tests.
#[derive(Clone)]
pub struct RuntimeDeps {
    pub discoverer: Arc<dyn RepositoryDiscoverer>,
    pub inspector: Arc<dyn WorktreeInspector>,
    pub registry: ActionRegistry,
    pub cascade: Arc<ConfirmationCascade>,
    pub sink: Arc<dyn EventSink>,
}

/// Compile `nodes`, merge the plan's runtime requirements into `base` and run.
pub async fn execute_operations(
    nodes: &[OperationNode],
    roots: &[PathBuf],
    base: &RuntimeOptions,
    deps: &RuntimeDeps,
    cancel: CancellationToken,
) -> Result<ExecutionOutcome, AppError> {
    let plan = compile_plan(nodes)?;
    let mut options = base.clone();
    options.merge_requirements(&plan.runtime);
    execute_tasks(roots, &plan.tasks, &options, deps, cancel).await
}

/// Run `tasks` against every repository found under `roots`.
///
/// Returns `Err` only when the run cannot start. Per-repository failures are
/// reported through events and the returned outcome.
pub async fn execute_tasks(
    roots: &[PathBuf],
    tasks: &[TaskDefinition],
    options: &RuntimeOptions,
    deps: &RuntimeDeps,
    cancel: CancellationToken,
) -> Result<ExecutionOutcome, AppError> {
    let started = Instant::now();
    let run_id = Uuid::new_v4();
    let prepared = prepare_tasks(tasks, &deps.registry)?;

    let repositories = deps
        .discoverer
        .discover(roots, options.include_nested_repositories)
        .await
        .map_err(|err| {
            AppError::new(
                ErrorCategory::DiscoveryError,
                format!("repository discovery failed: {}", err.message),
            )
            .with_code("RUN-DISCOVER-001")
            .with_context("roots", join_paths(roots))
        })?;
    let repository_count = repositories.len();
    tracing::info!(
        run_id = %run_id,
        repositories = repository_count,
        tasks = prepared.len(),
        parallelism = options.parallelism(),
        dry_run = options.dry_run,
        "starting run"
    );

    let state = RunState {
        run_id,
        tasks: prepared,
        options,
        deps,
        variables: Arc::new(options.variables.clone()),
        baseline: HashMap::new(),
        warnings: AtomicUsize::new(0),
        errors: AtomicUsize::new(0),
    };
    let state = if options.capture_initial_worktree_status && !cancel.is_cancelled() {
        state.with_baseline(&repositories).await
    } else {
        state
    };

    let semaphore = Arc::new(Semaphore::new(options.parallelism()));
    let mut reports = Vec::with_capacity(repository_count);
    for wave in depth_waves(repositories, options.process_repositories_by_descending_depth) {
        if cancel.is_cancelled() {
            break;
        }
        let mut in_flight = FuturesUnordered::new();
        for repository in wave {
            let semaphore = semaphore.clone();
            let state = &state;
            let cancel = &cancel;
            in_flight.push(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                if cancel.is_cancelled() {
                    return None;
                }
                Some(state.run_repository(&repository, cancel).await)
            });
        }
        while let Some(report) = in_flight.next().await {
            reports.extend(report);
        }
    }

    state.finalize_handlers().await;

    let cancelled = cancel.is_cancelled();
    if cancelled {
        tracing::warn!(run_id = %run_id, "run cancelled");
    }
    Ok(state.aggregate(reports, repository_count, started, cancelled))
}

struct PreparedStep {
    action_type: String,
    handler: Arc<dyn ActionHandler>,
    options: Map<String, Value>,
}

struct PreparedTask {
    definition: TaskDefinition,
    steps: Vec<PreparedStep>,
    mutating: bool,
}

/// Resolve every handler and validate every option set before touching a repository.
fn prepare_tasks(
    tasks: &[TaskDefinition],
    registry: &ActionRegistry,
) -> Result<Vec<PreparedTask>, AppError> {
    tasks
        .iter()
        .map(|task| {
            let mut steps = Vec::with_capacity(task.actions.len() + 1);
            if !task.files.is_empty() {
                steps.push(prepare_step(
                    task,
                    action_types::FILES_APPLY,
                    files_options(task)?,
                    registry,
                )?);
            }
            for action in &task.actions {
                steps.push(prepare_step(
                    task,
                    &action.action_type,
                    action.options.clone(),
                    registry,
                )?);
            }
            let mutating = !task.files.is_empty() || steps.iter().any(|s| s.handler.mutates());
            Ok(PreparedTask {
                definition: task.clone(),
                steps,
                mutating,
            })
        })
        .collect()
}

fn prepare_step(
    task: &TaskDefinition,
    action_type: &str,
    options: Map<String, Value>,
    registry: &ActionRegistry,
) -> Result<PreparedStep, AppError> {
    let handler = registry.get(action_type).ok_or_else(|| {
        AppError::new(
            ErrorCategory::ValidationError,
            format!(
                "task '{}' uses unregistered action type '{}'",
                task.name, action_type
            ),
        )
        .with_code("RUN-ACTION-001")
        .with_context("task", task.name.clone())
        .with_context("action", action_type)
    })?;
    handler.validate_options(&options).map_err(|err| {
        AppError::new(
            ErrorCategory::ValidationError,
            format!(
                "task '{}' has invalid options for '{}': {}",
                task.name, action_type, err.message
            ),
        )
        .with_code("RUN-ACTION-002")
        .with_context("task", task.name.clone())
        .with_context("action", action_type)
    })?;
    Ok(PreparedStep {
        action_type: action_type.to_string(),
        handler,
        options,
    })
}

/// Options for the implicit files step: the task's files plus branch and commit settings.
fn files_options(task: &TaskDefinition) -> Result<Map<String, Value>, AppError> {
    let to_value = |value: Result<Value, serde_json::Error>| {
        value.map_err(|err| {
            AppError::new(
                ErrorCategory::SerializationError,
                format!("failed to encode files for task '{}': {}", task.name, err),
            )
        })
    };
    let mut options = Map::new();
    options.insert("files".into(), to_value(serde_json::to_value(&task.files))?);
    if let Some(branch) = &task.branch {
        options.insert("branch".into(), to_value(serde_json::to_value(branch))?);
    }
    if let Some(commit) = &task.commit {
        options.insert("commit".into(), to_value(serde_json::to_value(commit))?);
    }
    Ok(options)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskResult {
    Applied,
    Skipped,
    Failed,
}

struct RepositoryReport {
    outcome: RepositoryOutcome,
    task_results: Vec<Option<TaskResult>>,
    applied_actions: usize,
    skipped_actions: usize,
}

struct RunState<'a> {
    run_id: Uuid,
    tasks: Vec<PreparedTask>,
    options: &'a RuntimeOptions,
    deps: &'a RuntimeDeps,
    variables: Arc<IndexMap<String, String>>,
    baseline: HashMap<PathBuf, WorktreeStatus>,
    warnings: AtomicUsize,
    errors: AtomicUsize,
}

impl<'a> RunState<'a> {
    fn emit(&self, event: Event) {
        match event.level {
            EventLevel::Warn => {
                self.warnings.fetch_add(1, Ordering::Relaxed);
            }
            EventLevel::Error => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
            EventLevel::Info => {}
        }
        self.deps.sink.emit(&event);
    }

    /// Snapshot every repository before any task runs, at most `parallelism` at a time.
    async fn with_baseline(mut self, repositories: &[PathBuf]) -> Self {
        let inspector = &self.deps.inspector;
        let snapshots: Vec<_> = stream::iter(repositories)
            .map(|repo| async move { (repo.clone(), inspector.status(repo).await) })
            .buffer_unordered(self.options.parallelism())
            .collect()
            .await;
        for (repository, snapshot) in snapshots {
            match snapshot {
                Ok(status) => {
                    self.baseline.insert(repository, status);
                }
                Err(err) => self.emit(
                    Event::warn(format!(
                        "could not capture initial worktree status, checking live instead: {}",
                        err.message
                    ))
                    .for_repository(&repository),
                ),
            }
        }
        self
    }

    async fn run_repository(&self, repository: &Path, cancel: &CancellationToken) -> RepositoryReport {
        let mut report = RepositoryReport {
            outcome: RepositoryOutcome::new(repository.to_path_buf()),
            task_results: vec![None; self.tasks.len()],
            applied_actions: 0,
            skipped_actions: 0,
        };

        // Tracks the worktree location; a task may move it.
        let mut current = repository.to_path_buf();
        for (index, task) in self.tasks.iter().enumerate() {
            if cancel.is_cancelled() {
                self.emit(
                    Event::skip(EventLevel::Warn, "run cancelled; remaining tasks not started")
                        .for_repository(&current)
                        .for_task(&task.definition.name),
                );
                break;
            }

            let result = self
                .run_task(repository, &mut current, task, &mut report)
                .await;
            report.task_results[index] = Some(result);
            match result {
                TaskResult::Applied => report.outcome.applied += 1,
                TaskResult::Skipped => report.outcome.skipped += 1,
                TaskResult::Failed => {
                    report.outcome.failed += 1;
                    if self.options.fail_fast {
                        if index + 1 < self.tasks.len() {
                            self.emit(
                                Event::skip(
                                    EventLevel::Warn,
                                    format!(
                                        "aborting {} remaining task(s) after failure",
                                        self.tasks.len() - index - 1
                                    ),
                                )
                                .for_repository(&current),
                            );
                        }
                        break;
                    }
                }
            }
        }

        if current.as_path() != repository {
            report.outcome.relocated_to = Some(current);
        }
        report.outcome.settle();
        report
    }

    /// `discovered` keys the baseline snapshot; `current` is where the worktree lives now.
    async fn run_task(
        &self,
        discovered: &Path,
        current: &mut PathBuf,
        task: &PreparedTask,
        report: &mut RepositoryReport,
    ) -> TaskResult {
        let name = task.definition.name.as_str();
        let start = current.clone();
        let repository = start.as_path();

        match self
            .check_safeguards(discovered, repository, &task.definition)
            .await
        {
            Ok(None) => {}
            Ok(Some(reason)) => {
                self.emit(
                    Event::skip(EventLevel::Warn, reason)
                        .for_repository(repository)
                        .for_task(name),
                );
                return TaskResult::Skipped;
            }
            Err(err) => return self.fail(repository, name, None, err, report),
        }

        if task.mutating
            && !self.options.dry_run
            && !self.options.assume_yes
            && !self.deps.cascade.assume_yes()
        {
            let prompt = format!("Apply '{}' to {}?", name, repository.display());
            match self.deps.cascade.confirm(&prompt).await {
                Ok(answer) if answer.confirmed => {}
                Ok(_) => {
                    self.emit(
                        Event::skip(EventLevel::Info, "declined by user")
                            .for_repository(repository)
                            .for_task(name),
                    );
                    return TaskResult::Skipped;
                }
                Err(err) => return self.fail(repository, name, None, err, report),
            }
        }

        let mut ctx = ActionContext {
            run_id: self.run_id,
            repository: repository.to_path_buf(),
            task: name.to_string(),
            dry_run: self.options.dry_run,
            variables: self.variables.clone(),
        };

        let mut touched = false;
        for step in &task.steps {
            let outcome = match step.handler.execute(&step.options, &ctx).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    return self.fail(&ctx.repository, name, Some(&step.action_type), err, report)
                }
            };
            for event in outcome.events {
                self.emit(event.with_defaults(
                    &ctx.repository,
                    name,
                    Some(step.action_type.as_str()),
                ));
            }
            let summary = match outcome.status {
                ActionStatus::Applied => {
                    touched = true;
                    report.applied_actions += 1;
                    Event::apply(outcome.message)
                }
                ActionStatus::Planned => {
                    touched = true;
                    report.applied_actions += 1;
                    Event::plan(outcome.message)
                }
                ActionStatus::Skipped => {
                    report.skipped_actions += 1;
                    Event::skip(EventLevel::Info, outcome.message)
                }
            };
            self.emit(
                summary
                    .for_repository(&ctx.repository)
                    .for_task(name)
                    .for_action(&step.action_type),
            );
            if let Some(moved) = outcome.relocated_to {
                tracing::info!(
                    from = %ctx.repository.display(),
                    to = %moved.display(),
                    "repository relocated"
                );
                ctx.repository = moved.clone();
                *current = moved;
            }
        }

        if touched {
            TaskResult::Applied
        } else {
            TaskResult::Skipped
        }
    }

    /// `Ok(Some(reason))` when a precondition is not met.
    async fn check_safeguards(
        &self,
        discovered: &Path,
        repository: &Path,
        task: &TaskDefinition,
    ) -> Result<Option<String>, AppError> {
        if task.requires_clean() {
            let status = match self.baseline.get(discovered) {
                Some(status) => status.clone(),
                None => self.deps.inspector.status(repository).await?,
            };
            if !status.clean {
                return Ok(Some("worktree has uncommitted changes".to_string()));
            }
        }
        if let Some(required) = &task.safeguards.require_branch {
            let status = self.deps.inspector.status(repository).await?;
            if status.branch.as_deref() != Some(required.as_str()) {
                return Ok(Some(format!(
                    "requires branch '{}', found '{}'",
                    required,
                    status.branch.as_deref().unwrap_or("(detached)")
                )));
            }
        }
        Ok(None)
    }

    fn fail(
        &self,
        repository: &Path,
        task: &str,
        action: Option<&str>,
        err: AppError,
        report: &mut RepositoryReport,
    ) -> TaskResult {
        let mut event = Event::error(err.to_string())
            .for_repository(repository)
            .for_task(task);
        if let Some(action) = action {
            event = event.for_action(action);
        }
        self.emit(event);
        if report.outcome.error.is_none() {
            report.outcome.error = Some(format!("{}: {}", task, err.message));
        }
        TaskResult::Failed
    }

    /// Give every handler used by the plan one chance to flush collected state.
    async fn finalize_handlers(&self) {
        let mut seen = Vec::new();
        for step in self.tasks.iter().flat_map(|task| task.steps.iter()) {
            if seen.contains(&step.action_type.as_str()) {
                continue;
            }
            seen.push(step.action_type.as_str());
            match step.handler.finalize().await {
                Ok(events) => {
                    for event in events {
                        self.emit(event.for_action(&step.action_type));
                    }
                }
                Err(err) => self.emit(Event::error(err.to_string()).for_action(&step.action_type)),
            }
        }
    }

    fn aggregate(
        &self,
        mut reports: Vec<RepositoryReport>,
        repository_count: usize,
        started: Instant,
        cancelled: bool,
    ) -> ExecutionOutcome {
        reports.sort_by(|a, b| a.outcome.path.cmp(&b.outcome.path));

        let mut stage_outcomes: Vec<StageOutcome> = self
            .tasks
            .iter()
            .map(|task| StageOutcome {
                name: task.definition.name.clone(),
                ..StageOutcome::default()
            })
            .collect();
        let mut summary = SummaryData {
            warning_events: self.warnings.load(Ordering::Relaxed),
            error_events: self.errors.load(Ordering::Relaxed),
            ..SummaryData::default()
        };

        for report in &reports {
            for (stage, result) in stage_outcomes.iter_mut().zip(&report.task_results) {
                match result {
                    Some(TaskResult::Applied) => stage.applied += 1,
                    Some(TaskResult::Skipped) => stage.skipped += 1,
                    Some(TaskResult::Failed) => stage.failed += 1,
                    None => {}
                }
            }
            summary.applied_actions += report.applied_actions;
            summary.skipped_actions += report.skipped_actions;
            match report.outcome.status {
                RepositoryStatus::Succeeded => summary.succeeded_repositories += 1,
                RepositoryStatus::Failed => summary.failed_repositories += 1,
                RepositoryStatus::Skipped => summary.skipped_repositories += 1,
            }
        }

        ExecutionOutcome {
            run_id: self.run_id,
            repository_count,
            duration: started.elapsed(),
            stage_outcomes,
            repositories: reports.into_iter().map(|report| report.outcome).collect(),
            summary,
            cancelled,
        }
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
