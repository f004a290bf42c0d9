use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use thiserror::Error;

/// Configuration errors detected while decoding, ordering or translating operations.
///
/// All of these are fatal and surface before any repository is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("operation at position {index} has no name")]
    MissingName { index: usize },

    #[error("duplicate operation name '{name}'")]
    DuplicateOperation { name: String },

    #[error("operation '{operation}' depends on unknown operation '{dependency}'")]
    UnknownDependency {
        operation: String,
        dependency: String,
    },

    #[error("operation dependencies form a cycle involving: {}", .operations.join(", "))]
    Cycle { operations: Vec<String> },

    #[error("operation '{operation}' uses unsupported kind '{kind}'")]
    UnsupportedOperation { operation: String, kind: String },

    #[error("operation '{operation}' must declare exactly one branch target, found {count}")]
    BranchTargetCount { operation: String, count: usize },

    #[error("operation '{operation}' declares no tasks")]
    EmptyTaskBundle { operation: String },

    #[error("invalid operations document: {0}")]
    InvalidDocument(String),
}

impl PlanError {
    /// Stable diagnostic code used when the error is reported.
    pub fn code(&self) -> &'static str {
        match self {
            PlanError::MissingName { .. } => "OPS-NAME-001",
            PlanError::DuplicateOperation { .. } => "OPS-DUP-001",
            PlanError::UnknownDependency { .. } => "OPS-DEP-001",
            PlanError::Cycle { .. } => "OPS-CYCLE-001",
            PlanError::UnsupportedOperation { .. } => "OPS-KIND-001",
            PlanError::BranchTargetCount { .. } => "OPS-BRANCH-001",
            PlanError::EmptyTaskBundle { .. } => "OPS-TASKS-001",
            PlanError::InvalidDocument(_) => "OPS-DOC-001",
        }
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self, PlanError::Cycle { .. })
    }
}

impl From<PlanError> for AppError {
    fn from(err: PlanError) -> Self {
        let code = err.code();
        let mut app = AppError::new(ErrorCategory::ValidationError, err.to_string()).with_code(code);
        match &err {
            PlanError::DuplicateOperation { name } => app.add_context("operation", name),
            PlanError::UnknownDependency {
                operation,
                dependency,
            } => {
                app.add_context("operation", operation);
                app.add_context("dependency", dependency);
            }
            PlanError::Cycle { operations } => app.add_context("cycle", &operations.join(" -> ")),
            PlanError::UnsupportedOperation { operation, kind } => {
                app.add_context("operation", operation);
                app.add_context("kind", kind);
            }
            PlanError::BranchTargetCount { operation, .. }
            | PlanError::EmptyTaskBundle { operation } => app.add_context("operation", operation),
            PlanError::MissingName { .. } | PlanError::InvalidDocument(_) => {}
        }
        app
    }
}
