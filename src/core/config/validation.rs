#![allow(clippy::result_large_err)]

use super::AppConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::str::FromStr;
use tracing_subscriber::filter::Directive;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration rules
    pub fn validate(config: &AppConfig) -> Result<(), AppError> {
        if config.defaults.parallelism == 0 {
            return Err(AppError::new(
                ErrorCategory::ConfigurationError,
                "defaults.parallelism must be at least 1",
            )
            .with_code("CFG-VALUE-001"));
        }

        if let Some(level) = &config.logging.level {
            if Directive::from_str(level).is_err() {
                return Err(AppError::new(
                    ErrorCategory::ConfigurationError,
                    format!("logging.level '{}' is not a valid tracing directive", level),
                )
                .with_code("CFG-VALUE-002"));
            }
        }

        Ok(())
    }
}
