#![allow(clippy::result_large_err)] // Git helpers return AppError so command failures keep repository context.

mod remote;

pub use remote::{RemoteProtocol, RemoteUrl};

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

/// Captured result of one git invocation.
#[derive(Clone, Debug, Default)]
pub struct GitOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Seam over the `git` executable so handlers can be exercised with fakes.
#[async_trait]
pub trait GitRunner: Send + Sync + 'static {
    async fn run(&self, repository: &Path, args: &[String]) -> Result<GitOutput, AppError>;
}

/// Runs the `git` binary found on `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioGitRunner;

#[async_trait]
impl GitRunner for TokioGitRunner {
    async fn run(&self, repository: &Path, args: &[String]) -> Result<GitOutput, AppError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(repository)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| {
                AppError::new(
                    ErrorCategory::ToolExecutionError,
                    format!("failed to execute git: {}", err),
                )
                .with_code("GIT-CMD-002")
                .with_context("repository", repository.display().to_string())
            })?;

        Ok(GitOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Typed git operations for one repository.
#[derive(Clone)]
pub struct GitClient {
    runner: Arc<dyn GitRunner>,
    repository: PathBuf,
}

impl GitClient {
    pub fn new(runner: Arc<dyn GitRunner>, repository: &Path) -> Self {
        Self {
            runner,
            repository: repository.to_path_buf(),
        }
    }

    pub fn repository(&self) -> &Path {
        &self.repository
    }

    async fn raw(&self, args: &[&str]) -> Result<GitOutput, AppError> {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        self.runner.run(&self.repository, &args).await
    }

    /// Run git and fail with `GIT-CMD-001` on a non-zero exit.
    async fn checked(&self, args: &[&str]) -> Result<String, AppError> {
        let output = self.raw(args).await?;
        if !output.success() {
            return Err(AppError::new(
                ErrorCategory::ToolExecutionError,
                format!(
                    "git {} failed with exit code {}: {}",
                    args.join(" "),
                    output.exit_code,
                    output.stderr.trim()
                ),
            )
            .with_code("GIT-CMD-001")
            .with_context("repository", self.repository.display().to_string()));
        }
        Ok(output.stdout.trim().to_string())
    }

    /// URL of `remote`, or `None` when the remote is not configured.
    pub async fn remote_url(&self, remote: &str) -> Result<Option<String>, AppError> {
        let output = self.raw(&["remote", "get-url", remote]).await?;
        if !output.success() {
            return Ok(None);
        }
        let url = output.stdout.trim();
        Ok((!url.is_empty()).then(|| url.to_string()))
    }

    pub async fn set_remote_url(&self, remote: &str, url: &str) -> Result<(), AppError> {
        self.checked(&["remote", "set-url", remote, url]).await.map(|_| ())
    }

    pub async fn status_porcelain(&self) -> Result<String, AppError> {
        self.checked(&["status", "--porcelain"]).await
    }

    pub async fn current_branch(&self) -> Result<String, AppError> {
        self.checked(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    pub async fn branch_exists(&self, branch: &str) -> Result<bool, AppError> {
        let reference = format!("refs/heads/{}", branch);
        let output = self
            .raw(&["show-ref", "--verify", "--quiet", &reference])
            .await?;
        Ok(output.success())
    }

    pub async fn rename_branch(&self, from: &str, to: &str) -> Result<(), AppError> {
        self.checked(&["branch", "-m", from, to]).await.map(|_| ())
    }

    pub async fn checkout(&self, branch: &str, start_point: Option<&str>) -> Result<(), AppError> {
        if self.branch_exists(branch).await? {
            return self.checked(&["checkout", branch]).await.map(|_| ());
        }
        let created = match start_point {
            Some(start) => self.checked(&["checkout", "-b", branch, start]).await,
            None => self.checked(&["checkout", "-b", branch]).await,
        };
        created.map(|_| ())
    }

    pub async fn push(&self, remote: &str, branch: &str) -> Result<(), AppError> {
        self.checked(&["push", "--set-upstream", remote, branch])
            .await
            .map(|_| ())
    }

    pub async fn delete_remote_branch(&self, remote: &str, branch: &str) -> Result<(), AppError> {
        self.checked(&["push", remote, "--delete", branch])
            .await
            .map(|_| ())
    }

    pub async fn add(&self, paths: &[String]) -> Result<(), AppError> {
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.checked(&args).await.map(|_| ())
    }

    /// Commit staged changes. Returns false when nothing was staged.
    pub async fn commit(&self, message: &str) -> Result<bool, AppError> {
        let staged = self.raw(&["diff", "--cached", "--quiet"]).await?;
        if staged.success() {
            return Ok(false);
        }
        self.checked(&["commit", "-m", message]).await?;
        Ok(true)
    }
}
