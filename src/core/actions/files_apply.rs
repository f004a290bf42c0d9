use crate::core::actions::decode_options;
use crate::core::error::AppError;
use crate::core::git::{GitClient, GitRunner};
use crate::core::operations::task::{
    action_types, FileMode, TaskBranchDefinition, TaskCommitDefinition, TaskFileDefinition,
};
use crate::core::runtime::action::{ActionContext, ActionHandler, ActionOutcome};
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Component, Path};
use std::sync::{Arc, OnceLock};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilesOptions {
    files: Vec<TaskFileDefinition>,
    #[serde(default)]
    branch: Option<TaskBranchDefinition>,
    #[serde(default)]
    commit: Option<TaskCommitDefinition>,
}

impl FilesOptions {
    fn parse(action_type: &str, options: &Map<String, Value>) -> Result<Self, AppError> {
        let opts: Self = decode_options(action_type, options)?;
        for file in &opts.files {
            validate_relative(&file.path)?;
        }
        Ok(opts)
    }
}

fn validate_relative(path: &str) -> Result<(), AppError> {
    let candidate = Path::new(path);
    let escapes = candidate.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if path.trim().is_empty() || escapes {
        return Err(AppError::new(
            ErrorCategory::ValidationError,
            format!("file path '{}' must be relative to the repository", path),
        )
        .with_code("ACT-FILES-001"));
    }
    Ok(())
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").expect("placeholder pattern is valid")
    })
}

/// Replace `{{ name }}` placeholders. Unknown names are an error.
pub(crate) fn render_template(
    template: &str,
    variables: &IndexMap<String, String>,
) -> Result<String, AppError> {
    let mut missing = Vec::new();
    let rendered = placeholder_pattern().replace_all(template, |caps: &Captures<'_>| {
        let name = &caps[1];
        match variables.get(name) {
            Some(value) => value.clone(),
            None => {
                missing.push(name.to_string());
                caps[0].to_string()
            }
        }
    });
    if !missing.is_empty() {
        return Err(AppError::new(
            ErrorCategory::ValidationError,
            format!("undefined template variable(s): {}", missing.join(", ")),
        )
        .with_code("ACT-FILES-002"));
    }
    Ok(rendered.into_owned())
}

/// Writes templated files into a repository, optionally on a branch with a commit.
pub struct FilesApplyHandler {
    runner: Arc<dyn GitRunner>,
}

impl FilesApplyHandler {
    pub fn new(runner: Arc<dyn GitRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ActionHandler for FilesApplyHandler {
    fn action_type(&self) -> &'static str {
        action_types::FILES_APPLY
    }

    fn validate_options(&self, options: &Map<String, Value>) -> Result<(), AppError> {
        FilesOptions::parse(self.action_type(), options).map(|_| ())
    }

    async fn execute(
        &self,
        options: &Map<String, Value>,
        ctx: &ActionContext,
    ) -> Result<ActionOutcome, AppError> {
        let opts = FilesOptions::parse(self.action_type(), options)?;
        let mut variables = (*ctx.variables).clone();
        if let Some(name) = ctx.repository.file_name() {
            variables
                .entry("repository_name".to_string())
                .or_insert_with(|| name.to_string_lossy().into_owned());
        }

        let mut pending = Vec::new();
        for file in &opts.files {
            let content = render_template(&file.content, &variables)?;
            let target = ctx.repository.join(&file.path);
            let existing = tokio::fs::read_to_string(&target).await.ok();
            let unchanged = match (&existing, file.mode) {
                (Some(_), FileMode::SkipExisting) => true,
                (Some(current), FileMode::Overwrite) => *current == content,
                (None, _) => false,
            };
            if !unchanged {
                pending.push((file.path.clone(), target, content));
            }
        }

        if pending.is_empty() {
            return Ok(ActionOutcome::skipped("files already up to date"));
        }
        if ctx.dry_run {
            let paths: Vec<&str> = pending.iter().map(|(path, _, _)| path.as_str()).collect();
            return Ok(ActionOutcome::planned(format!(
                "would write {}",
                paths.join(", ")
            )));
        }

        let git = GitClient::new(self.runner.clone(), &ctx.repository);
        if let Some(branch) = &opts.branch {
            git.checkout(&branch.name, branch.start_point.as_deref())
                .await?;
        }

        let mut written = Vec::with_capacity(pending.len());
        for (relative, target, content) in pending {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, content).await.map_err(|err| {
                AppError::new(
                    ErrorCategory::IoError,
                    format!("failed to write {}: {}", target.display(), err),
                )
                .with_code("ACT-FILES-003")
            })?;
            written.push(relative);
        }

        let mut message = format!("wrote {}", written.join(", "));
        if let Some(commit) = &opts.commit {
            git.add(&written).await?;
            if git.commit(&commit.message).await? {
                message.push_str("; committed");
            }
            if let Some(branch) = &opts.branch {
                if let Some(remote) = &branch.push_remote {
                    git.push(remote, &branch.name).await?;
                    message.push_str(&format!("; pushed {} to {}", branch.name, remote));
                }
            }
        }
        Ok(ActionOutcome::applied(message))
    }
}
