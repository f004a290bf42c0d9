#![allow(clippy::result_large_err)] // Document loading returns AppError to keep file context alongside parse failures.

use crate::core::error::AppError;
use crate::core::git::RemoteProtocol;
use crate::core::operations::error::PlanError;
use crate::core::operations::task::TaskDefinition;
use crate::core::types::ErrorCategory;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

const SUPPORTED_VERSION: &str = "1";

fn default_version() -> String {
    SUPPORTED_VERSION.to_string()
}

/// Root of an operations file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OperationsDocument {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    #[serde(default)]
    pub settings: DocumentSettings,
    #[serde(default)]
    pub variables: IndexMap<String, String>,
    #[serde(default)]
    pub operations: Vec<RawOperationNode>,
}

/// Run settings that override configuration defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentSettings {
    pub parallelism: Option<usize>,
    pub assume_yes: Option<bool>,
    pub fail_fast: Option<bool>,
}

/// Operation entry as written in YAML, before its kind is decoded.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawOperationNode {
    #[serde(default)]
    pub name: Option<String>,
    pub operation: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

/// A named, declared unit of work with dependencies on other named nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationNode {
    pub name: String,
    pub operation: Operation,
    pub dependencies: Vec<String>,
}

impl OperationNode {
    pub fn new(name: impl Into<String>, operation: Operation) -> Self {
        Self {
            name: name.into(),
            operation,
            dependencies: Vec::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Explicit name when present, otherwise the operation's intrinsic name.
    pub fn display_name(&self) -> &str {
        let explicit = self.name.trim();
        if explicit.is_empty() {
            self.operation.intrinsic_name()
        } else {
            explicit
        }
    }

    /// Decode a raw YAML entry. `index` identifies unnamed entries in errors.
    pub fn decode(index: usize, raw: RawOperationNode) -> Result<Self, PlanError> {
        let label = raw
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", index + 1));
        let operation = Operation::decode(&label, raw.operation.trim(), raw.options)?;
        Ok(Self {
            name: raw.name.unwrap_or_default(),
            operation,
            dependencies: raw.depends_on,
        })
    }
}

/// Closed set of operation kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Tasks(TasksOperation),
    RemoteUpdate(RemoteUpdateOperation),
    ProtocolConversion(ProtocolConversionOperation),
    RenameDirectories(RenameOperation),
    PromoteBranch(PromoteOperation),
    AuditReport(AuditOperation),
}

impl Operation {
    /// Kind identifier used in operations files.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Tasks(_) => "tasks",
            Operation::RemoteUpdate(_) => "remote-update",
            Operation::ProtocolConversion(_) => "convert-protocol",
            Operation::RenameDirectories(_) => "rename-directories",
            Operation::PromoteBranch(_) => "promote-branch",
            Operation::AuditReport(_) => "audit-report",
        }
    }

    /// Name used when a node does not declare one. Task bundles have none.
    pub fn intrinsic_name(&self) -> &'static str {
        match self {
            Operation::Tasks(_) => "",
            Operation::RemoteUpdate(_) => "update canonical remotes",
            Operation::ProtocolConversion(_) => "convert remote protocol",
            Operation::RenameDirectories(_) => "rename directories",
            Operation::PromoteBranch(_) => "promote default branch",
            Operation::AuditReport(_) => "generate audit report",
        }
    }

    fn decode(label: &str, kind: &str, options: Map<String, Value>) -> Result<Self, PlanError> {
        match kind {
            "tasks" => decode_options(label, options).map(Operation::Tasks),
            "remote-update" => decode_options(label, options).map(Operation::RemoteUpdate),
            "convert-protocol" => {
                decode_options(label, options).map(Operation::ProtocolConversion)
            }
            "rename-directories" => {
                decode_options(label, options).map(Operation::RenameDirectories)
            }
            "promote-branch" => decode_options(label, options).map(Operation::PromoteBranch),
            "audit-report" => decode_options(label, options).map(Operation::AuditReport),
            other => Err(PlanError::UnsupportedOperation {
                operation: label.to_string(),
                kind: other.to_string(),
            }),
        }
    }
}

fn decode_options<T: DeserializeOwned>(
    label: &str,
    options: Map<String, Value>,
) -> Result<T, PlanError> {
    serde_json::from_value(Value::Object(options))
        .map_err(|err| PlanError::InvalidDocument(format!("operation '{}': {}", label, err)))
}

/// Pass-through bundle of task definitions.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TasksOperation {
    pub tasks: Vec<TaskDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteUpdateOperation {
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolConversionOperation {
    pub from: RemoteProtocol,
    pub to: RemoteProtocol,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RenameOperation {
    #[serde(default)]
    pub require_clean: bool,
    #[serde(default)]
    pub include_owner: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PromoteOperation {
    #[serde(default)]
    pub targets: Vec<BranchTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BranchTarget {
    #[serde(default)]
    pub remote_name: Option<String>,
    #[serde(default)]
    pub source_branch: Option<String>,
    pub target_branch: String,
    #[serde(default)]
    pub push_to_remote: bool,
    #[serde(default)]
    pub delete_source_branch: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuditOperation {
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl OperationsDocument {
    /// Load and validate an operations document from a YAML file.
    pub fn load_from_file(path: &Path) -> Result<Self, AppError> {
        let text = fs::read_to_string(path).map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to read {}: {}", path.display(), err),
            )
        })?;
        Self::parse(&text).map_err(|err| err.with_context("file", path.display().to_string()))
    }

    pub fn parse(text: &str) -> Result<Self, AppError> {
        let doc: OperationsDocument = serde_yaml::from_str(text).map_err(|err| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!("failed to parse operations document: {}", err),
            )
            .with_code("OPS-DOC-001")
        })?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.version != SUPPORTED_VERSION {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!(
                    "unsupported operations version {}, expected {}",
                    self.version, SUPPORTED_VERSION
                ),
            )
            .with_code("OPS-DOC-002"));
        }
        if self.settings.parallelism == Some(0) {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "settings.parallelism must be >= 1",
            )
            .with_code("OPS-DOC-003"));
        }
        Ok(())
    }

    /// Decode every raw entry into a typed node, in document order.
    pub fn nodes(&self) -> Result<Vec<OperationNode>, PlanError> {
        self.operations
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, raw)| OperationNode::decode(index, raw))
            .collect()
    }
}
