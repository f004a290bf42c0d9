pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;

use crate::logging::ConsoleOutput;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// File name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "gitfleet.toml";

/// Main configuration loaded from gitfleet.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    /// Run defaults applied when the operations document and CLI leave them unset
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Run defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefaultsConfig {
    /// Directories searched for repositories
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    /// Repositories processed concurrently
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Skip confirmation prompts
    #[serde(default)]
    pub assume_yes: bool,

    /// Abort a repository's remaining tasks after the first failure
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
}

/// `[logging]` section. Unset values fall back to logging defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LoggingSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_output: Option<ConsoleOutput>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_file: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

fn default_parallelism() -> usize {
    1
}

fn default_fail_fast() -> bool {
    true
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        DefaultsConfig {
            roots: Vec::new(),
            parallelism: default_parallelism(),
            assume_yes: false,
            fail_fast: default_fail_fast(),
        }
    }
}
