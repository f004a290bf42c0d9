use crate::core::error::AppError;
use crate::core::git::{GitClient, GitRunner, TokioGitRunner};
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Snapshot of a repository worktree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorktreeStatus {
    pub clean: bool,
    pub branch: Option<String>,
}

#[async_trait]
pub trait WorktreeInspector: Send + Sync + 'static {
    async fn status(&self, repository: &Path) -> Result<WorktreeStatus, AppError>;
}

/// Reads worktree state through `git status` and `git rev-parse`.
#[derive(Clone)]
pub struct GitWorktreeInspector {
    runner: Arc<dyn GitRunner>,
}

impl Default for GitWorktreeInspector {
    fn default() -> Self {
        Self::new(Arc::new(TokioGitRunner))
    }
}

impl GitWorktreeInspector {
    pub fn new(runner: Arc<dyn GitRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl WorktreeInspector for GitWorktreeInspector {
    async fn status(&self, repository: &Path) -> Result<WorktreeStatus, AppError> {
        let git = GitClient::new(self.runner.clone(), repository);
        let porcelain = git.status_porcelain().await?;
        // an unborn HEAD has no branch name yet
        let branch = git
            .current_branch()
            .await
            .ok()
            .filter(|name| !name.is_empty() && name != "HEAD");
        Ok(WorktreeStatus {
            clean: porcelain.trim().is_empty(),
            branch,
        })
    }
}
