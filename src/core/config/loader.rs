#![allow(clippy::result_large_err)]

use super::{AppConfig, ConfigValidator, CONFIG_FILE_NAME};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from the workspace directory (workspace/gitfleet.toml)
    /// Environment variables override config file values
    /// A missing file yields defaults plus env overrides
    pub fn load_from_workspace(workspace_path: &Path) -> Result<AppConfig, AppError> {
        let config_path = workspace_path.join(CONFIG_FILE_NAME);
        let mut config = Self::load_from_file(&config_path)?.unwrap_or_default();

        Self::apply_env_overrides(&mut config);
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load config from specific file path
    /// Returns Ok(None) if file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<AppConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let config: AppConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_code("CFG-PARSE-001")
        })?;

        Ok(Some(config))
    }

    /// Apply environment variable overrides to the configuration
    /// Unparseable values are ignored
    fn apply_env_overrides(config: &mut AppConfig) {
        if let Some(roots) = env::var_os("GITFLEET_ROOTS") {
            let roots: Vec<_> = env::split_paths(&roots)
                .filter(|path| !path.as_os_str().is_empty())
                .collect();
            if !roots.is_empty() {
                config.defaults.roots = roots;
            }
        }

        if let Ok(parallelism) = env::var("GITFLEET_PARALLELISM") {
            if let Ok(parallelism) = parallelism.trim().parse::<usize>() {
                config.defaults.parallelism = parallelism;
            }
        }

        if let Ok(assume_yes) = env::var("GITFLEET_ASSUME_YES") {
            if let Ok(assume_yes) = assume_yes.trim().parse::<bool>() {
                config.defaults.assume_yes = assume_yes;
            }
        }

        if let Ok(fail_fast) = env::var("GITFLEET_FAIL_FAST") {
            if let Ok(fail_fast) = fail_fast.trim().parse::<bool>() {
                config.defaults.fail_fast = fail_fast;
            }
        }

        if let Ok(level) = env::var("GITFLEET_LOG_LEVEL") {
            if !level.trim().is_empty() {
                config.logging.level = Some(level);
            }
        }
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "GITFLEET_ROOTS - Override repository roots (platform path list separator)",
            "GITFLEET_PARALLELISM - Override repositories processed concurrently (default: 1)",
            "GITFLEET_ASSUME_YES - Skip confirmation prompts (true/false)",
            "GITFLEET_FAIL_FAST - Abort a repository after its first failed task (true/false, default: true)",
            "GITFLEET_LOG_LEVEL - Override logging level (default: info)",
            "GITFLEET_LOG - Full tracing filter directive, takes precedence over RUST_LOG",
        ]
    }
}
