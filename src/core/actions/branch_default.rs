use crate::core::actions::{decode_options, default_remote_name};
use crate::core::error::AppError;
use crate::core::git::{GitClient, GitRunner};
use crate::core::operations::task::action_types;
use crate::core::runtime::action::{ActionContext, ActionHandler, ActionOutcome};
use crate::core::runtime::events::Event;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

const DEFAULT_SOURCE_BRANCH: &str = "master";

fn default_source_branch() -> String {
    DEFAULT_SOURCE_BRANCH.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BranchDefaultOptions {
    target_branch: String,
    #[serde(default = "default_source_branch")]
    source_branch: String,
    #[serde(default = "default_remote_name")]
    remote_name: String,
    #[serde(default)]
    push_to_remote: bool,
    #[serde(default)]
    delete_source_branch: bool,
}

impl BranchDefaultOptions {
    fn parse(action_type: &str, options: &Map<String, Value>) -> Result<Self, AppError> {
        let opts: Self = decode_options(action_type, options)?;
        if opts.target_branch.trim().is_empty() {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "target_branch must not be empty",
            )
            .with_code("ACT-BRANCH-001"));
        }
        if opts.target_branch == opts.source_branch {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!(
                    "source and target branch are both '{}'",
                    opts.target_branch
                ),
            )
            .with_code("ACT-BRANCH-001"));
        }
        Ok(opts)
    }
}

/// Promotes a new default branch by renaming the old one, e.g. master to main.
pub struct BranchDefaultHandler {
    runner: Arc<dyn GitRunner>,
}

impl BranchDefaultHandler {
    pub fn new(runner: Arc<dyn GitRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ActionHandler for BranchDefaultHandler {
    fn action_type(&self) -> &'static str {
        action_types::BRANCH_DEFAULT
    }

    fn validate_options(&self, options: &Map<String, Value>) -> Result<(), AppError> {
        BranchDefaultOptions::parse(self.action_type(), options).map(|_| ())
    }

    async fn execute(
        &self,
        options: &Map<String, Value>,
        ctx: &ActionContext,
    ) -> Result<ActionOutcome, AppError> {
        let opts = BranchDefaultOptions::parse(self.action_type(), options)?;
        let git = GitClient::new(self.runner.clone(), &ctx.repository);

        if git.branch_exists(&opts.target_branch).await? {
            return Ok(ActionOutcome::skipped(format!(
                "branch '{}' already exists",
                opts.target_branch
            )));
        }
        if !git.branch_exists(&opts.source_branch).await? {
            return Ok(ActionOutcome::skipped(format!(
                "source branch '{}' not found",
                opts.source_branch
            ))
            .with_event(Event::warn(format!(
                "cannot promote '{}': no local '{}' branch",
                opts.target_branch, opts.source_branch
            ))));
        }
        if ctx.dry_run {
            return Ok(ActionOutcome::planned(format!(
                "would rename '{}' to '{}'",
                opts.source_branch, opts.target_branch
            )));
        }

        git.rename_branch(&opts.source_branch, &opts.target_branch)
            .await?;
        let mut outcome = ActionOutcome::applied(format!(
            "renamed '{}' to '{}'",
            opts.source_branch, opts.target_branch
        ));
        if opts.push_to_remote {
            git.push(&opts.remote_name, &opts.target_branch).await?;
            outcome = outcome.with_event(Event::apply(format!(
                "pushed '{}' to {}",
                opts.target_branch, opts.remote_name
            )));
        }
        if opts.delete_source_branch {
            git.delete_remote_branch(&opts.remote_name, &opts.source_branch)
                .await?;
            outcome = outcome.with_event(Event::apply(format!(
                "deleted '{}' from {}",
                opts.source_branch, opts.remote_name
            )));
        }
        Ok(outcome)
    }
}
