use crate::core::config::LoggingSection;
use crate::logging::layers::console::ConsoleOutput;
use crate::Result;
use anyhow::anyhow;
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::filter::Directive;

const DEFAULT_LEVEL: &str = "info";

/// Resolved logging configuration after the `[logging]` section and CLI overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub log_dir: Option<PathBuf>,
    pub default_level: String,
    pub enable_file: bool,
    pub console_output: Option<ConsoleOutput>,
    /// Stdout carries machine-readable output, so console logs must stay off it.
    pub reserve_stdout: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            default_level: DEFAULT_LEVEL.to_string(),
            enable_file: false,
            console_output: None,
            reserve_stdout: false,
        }
    }
}

impl LoggingConfig {
    /// Apply the `[logging]` section on top of the defaults.
    pub fn from_section(section: &LoggingSection) -> Result<Self> {
        let mut config = LoggingConfig::default();
        if let Some(level) = &section.level {
            config.default_level = level.clone();
        }
        if let Some(enable_file) = section.enable_file {
            config.enable_file = enable_file;
        }
        if let Some(log_dir) = &section.log_dir {
            config.log_dir = Some(log_dir.clone());
        }
        config.console_output = section.console_output;
        config.validate()?;
        Ok(config)
    }

    /// Override the level, typically from `--log-level`.
    pub fn with_level(mut self, level: Option<&str>) -> Result<Self> {
        if let Some(level) = level {
            self.default_level = level.to_string();
            self.validate()?;
        }
        Ok(self)
    }

    pub fn with_reserved_stdout(mut self, reserve: bool) -> Self {
        self.reserve_stdout = reserve;
        self
    }

    fn validate(&self) -> Result<()> {
        Directive::from_str(&self.default_level)
            .map_err(|_| anyhow!("logging.level must be a valid tracing directive"))?;
        Ok(())
    }
}
