use crate::core::actions::{decode_options, default_remote_name, load_remote};
use crate::core::error::AppError;
use crate::core::git::{GitClient, GitRunner, RemoteUrl};
use crate::core::operations::task::action_types;
use crate::core::runtime::action::{ActionContext, ActionHandler, ActionOutcome};
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FolderRenameOptions {
    // enforced by the runtime before the handler runs
    #[serde(default)]
    #[allow(dead_code)]
    require_clean: bool,
    #[serde(default)]
    include_owner: bool,
    #[serde(default = "default_remote_name")]
    remote_name: String,
}

/// Renames a repository directory to match its remote's repository name.
pub struct FolderRenameHandler {
    runner: Arc<dyn GitRunner>,
}

impl FolderRenameHandler {
    pub fn new(runner: Arc<dyn GitRunner>) -> Self {
        Self { runner }
    }
}

/// Directory a repository should live in.
///
/// With `include_owner` the repository sits under an owner directory; an
/// existing parent already named after the owner is reused.
pub(crate) fn target_directory(repository: &Path, remote: &RemoteUrl, include_owner: bool) -> PathBuf {
    let parent = repository.parent().unwrap_or_else(|| Path::new(""));
    if !include_owner {
        return parent.join(&remote.repository);
    }
    if parent.ends_with(&remote.owner) {
        parent.join(&remote.repository)
    } else {
        parent.join(&remote.owner).join(&remote.repository)
    }
}

#[async_trait]
impl ActionHandler for FolderRenameHandler {
    fn action_type(&self) -> &'static str {
        action_types::FOLDER_RENAME
    }

    fn validate_options(&self, options: &Map<String, Value>) -> Result<(), AppError> {
        decode_options::<FolderRenameOptions>(self.action_type(), options).map(|_| ())
    }

    async fn execute(
        &self,
        options: &Map<String, Value>,
        ctx: &ActionContext,
    ) -> Result<ActionOutcome, AppError> {
        let opts: FolderRenameOptions = decode_options(self.action_type(), options)?;
        let git = GitClient::new(self.runner.clone(), &ctx.repository);
        let (_, remote) = match load_remote(&git, &opts.remote_name).await? {
            Ok(found) => found,
            Err(skipped) => return Ok(skipped),
        };

        let target = target_directory(&ctx.repository, &remote, opts.include_owner);
        if target == ctx.repository {
            return Ok(ActionOutcome::skipped("directory already matches remote"));
        }
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Err(AppError::new(
                ErrorCategory::ActionError,
                format!("cannot rename to {}: path already exists", target.display()),
            )
            .with_code("ACT-RENAME-001")
            .with_context("repository", ctx.repository.display().to_string()));
        }
        if ctx.dry_run {
            return Ok(ActionOutcome::planned(format!(
                "would rename {} to {}",
                ctx.repository.display(),
                target.display()
            )));
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|err| {
                AppError::new(
                    ErrorCategory::IoError,
                    format!("failed to create {}: {}", parent.display(), err),
                )
                .with_code("ACT-RENAME-002")
            })?;
        }
        tokio::fs::rename(&ctx.repository, &target)
            .await
            .map_err(|err| {
                AppError::new(
                    ErrorCategory::IoError,
                    format!(
                        "failed to rename {} to {}: {}",
                        ctx.repository.display(),
                        target.display(),
                        err
                    ),
                )
                .with_code("ACT-RENAME-003")
            })?;
        Ok(ActionOutcome::applied(format!(
            "renamed {} to {}",
            ctx.repository.display(),
            target.display()
        ))
        .relocated(target))
    }
}
