#![allow(clippy::result_large_err)] // Discovery returns AppError so callers keep the failing root in context.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use walkdir::WalkDir;

/// Finds repositories below a set of roots.
#[async_trait]
pub trait RepositoryDiscoverer: Send + Sync + 'static {
    async fn discover(
        &self,
        roots: &[PathBuf],
        include_nested: bool,
    ) -> Result<Vec<PathBuf>, AppError>;
}

/// Walks the filesystem; any directory holding a `.git` entry is a repository.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilesystemDiscoverer;

#[async_trait]
impl RepositoryDiscoverer for FilesystemDiscoverer {
    async fn discover(
        &self,
        roots: &[PathBuf],
        include_nested: bool,
    ) -> Result<Vec<PathBuf>, AppError> {
        let roots: Vec<PathBuf> = roots.iter().map(|root| expand_home(root)).collect();
        spawn_blocking(move || walk_roots(&roots, include_nested))
            .await
            .map_err(|err| {
                AppError::new(
                    ErrorCategory::InternalError,
                    format!("repository discovery task failed: {}", err),
                )
            })?
    }
}

fn walk_roots(roots: &[PathBuf], include_nested: bool) -> Result<Vec<PathBuf>, AppError> {
    let mut found = BTreeSet::new();
    for root in roots {
        if !root.is_dir() {
            return Err(AppError::new(
                ErrorCategory::DiscoveryError,
                format!("root {} is not a directory", root.display()),
            )
            .with_code("DISCOVER-ROOT-001")
            .with_context("root", root.display().to_string()));
        }

        let mut walker = WalkDir::new(root).follow_links(false).into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(root = %root.display(), error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            if entry.file_name() == ".git" {
                walker.skip_current_dir();
                continue;
            }
            if is_repository(entry.path()) {
                found.insert(entry.path().to_path_buf());
                if !include_nested {
                    walker.skip_current_dir();
                }
            }
        }
    }
    Ok(found.into_iter().collect())
}

fn is_repository(path: &Path) -> bool {
    path.join(".git").exists()
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs_next::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

fn depth(path: &Path) -> usize {
    path.components().count()
}

/// Stable processing order: by path, or deepest first (ties by path) when requested.
pub fn order_repositories(mut paths: Vec<PathBuf>, descending_depth: bool) -> Vec<PathBuf> {
    if descending_depth {
        paths.sort_by(|a, b| (Reverse(depth(a)), a).cmp(&(Reverse(depth(b)), b)));
    } else {
        paths.sort();
    }
    paths.dedup();
    paths
}

/// Group repositories into batches that may run concurrently.
///
/// With descending depth each wave holds one depth level, deepest first, so a
/// repository never runs while one nested inside it is still in flight.
pub fn depth_waves(paths: Vec<PathBuf>, descending_depth: bool) -> Vec<Vec<PathBuf>> {
    let ordered = order_repositories(paths, descending_depth);
    if !descending_depth {
        return if ordered.is_empty() {
            Vec::new()
        } else {
            vec![ordered]
        };
    }

    let mut waves: Vec<Vec<PathBuf>> = Vec::new();
    let mut current_depth = None;
    for path in ordered {
        let level = depth(&path);
        if current_depth != Some(level) {
            waves.push(Vec::new());
            current_depth = Some(level);
        }
        if let Some(wave) = waves.last_mut() {
            wave.push(path);
        }
    }
    waves
}
