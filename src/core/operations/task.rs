use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Action type identifiers understood by the built-in handlers.
pub mod action_types {
    pub const REMOTE_UPDATE: &str = "repo.remote.update";
    pub const CONVERT_PROTOCOL: &str = "repo.remote.convert-protocol";
    pub const FOLDER_RENAME: &str = "repo.folder.rename";
    pub const BRANCH_DEFAULT: &str = "branch.default";
    pub const AUDIT_REPORT: &str = "audit.report";
    pub const FILES_APPLY: &str = "repo.files.apply";
}

/// Remote used when an operation does not name one.
pub const DEFAULT_REMOTE_NAME: &str = "origin";

/// Executable unit produced by the translator and run once per repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskDefinition {
    pub name: String,
    #[serde(default)]
    pub ensure_clean: bool,
    #[serde(default)]
    pub actions: Vec<TaskActionDefinition>,
    #[serde(default)]
    pub files: Vec<TaskFileDefinition>,
    #[serde(default)]
    pub branch: Option<TaskBranchDefinition>,
    #[serde(default)]
    pub commit: Option<TaskCommitDefinition>,
    #[serde(default)]
    pub safeguards: TaskSafeguards,
}

impl TaskDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ensure_clean: false,
            actions: Vec::new(),
            files: Vec::new(),
            branch: None,
            commit: None,
            safeguards: TaskSafeguards::default(),
        }
    }

    pub fn with_action(mut self, action_type: &str, options: Map<String, Value>) -> Self {
        self.actions.push(TaskActionDefinition {
            action_type: action_type.to_string(),
            options,
        });
        self
    }

    pub fn with_ensure_clean(mut self, ensure_clean: bool) -> Self {
        self.ensure_clean = ensure_clean;
        self
    }

    /// Whether the repository worktree must be clean before this task runs.
    pub fn requires_clean(&self) -> bool {
        self.ensure_clean || self.safeguards.require_clean
    }
}

/// One typed action inside a task, dispatched by `action_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskActionDefinition {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub options: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileMode {
    #[default]
    Overwrite,
    SkipExisting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskFileDefinition {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub mode: FileMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskBranchDefinition {
    pub name: String,
    #[serde(default)]
    pub start_point: Option<String>,
    #[serde(default)]
    pub push_remote: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskCommitDefinition {
    pub message: String,
}

/// Preconditions checked before a task touches a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSafeguards {
    #[serde(default)]
    pub require_clean: bool,
    #[serde(default)]
    pub require_branch: Option<String>,
}

/// Options controlling how the runtime traverses repositories and tasks.
///
/// `include_nested_repositories`, `process_repositories_by_descending_depth` and
/// `capture_initial_worktree_status` accumulate with boolean OR across every
/// translated operation: once a node requires one, it stays enabled for the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeOptions {
    pub include_nested_repositories: bool,
    pub process_repositories_by_descending_depth: bool,
    pub capture_initial_worktree_status: bool,
    pub assume_yes: bool,
    pub dry_run: bool,
    pub fail_fast: bool,
    pub workflow_parallelism: usize,
    pub variables: IndexMap<String, String>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            include_nested_repositories: false,
            process_repositories_by_descending_depth: false,
            capture_initial_worktree_status: false,
            assume_yes: false,
            dry_run: false,
            fail_fast: true,
            workflow_parallelism: 1,
            variables: IndexMap::new(),
        }
    }
}

impl RuntimeOptions {
    /// OR the capability flags of `other` into `self`. Never clears a flag.
    pub fn merge_requirements(&mut self, other: &RuntimeOptions) {
        self.include_nested_repositories |= other.include_nested_repositories;
        self.process_repositories_by_descending_depth |=
            other.process_repositories_by_descending_depth;
        self.capture_initial_worktree_status |= other.capture_initial_worktree_status;
    }

    pub fn parallelism(&self) -> usize {
        self.workflow_parallelism.max(1)
    }
}
