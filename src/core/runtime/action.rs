#![allow(clippy::result_large_err)] // Handler trait and registry return AppError directly for structured diagnostics without boxing.

use crate::core::error::AppError;
use crate::core::runtime::events::Event;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Repository and task context handed to every handler invocation.
#[derive(Clone, Debug)]
pub struct ActionContext {
    pub run_id: Uuid,
    pub repository: PathBuf,
    pub task: String,
    pub dry_run: bool,
    pub variables: Arc<IndexMap<String, String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Applied,
    Skipped,
    Planned,
}

/// What a handler did to one repository.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub status: ActionStatus,
    pub message: String,
    pub events: Vec<Event>,
    /// New repository location when the handler moved the worktree.
    pub relocated_to: Option<PathBuf>,
}

impl ActionOutcome {
    fn new(status: ActionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            events: Vec::new(),
            relocated_to: None,
        }
    }

    pub fn applied(message: impl Into<String>) -> Self {
        Self::new(ActionStatus::Applied, message)
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self::new(ActionStatus::Skipped, message)
    }

    pub fn planned(message: impl Into<String>) -> Self {
        Self::new(ActionStatus::Planned, message)
    }

    /// Later tasks for this repository run against `path`.
    pub fn relocated(mut self, path: impl Into<PathBuf>) -> Self {
        self.relocated_to = Some(path.into());
        self
    }

    pub fn with_event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }
}

/// Trait implemented by repository action handlers.
#[async_trait]
pub trait ActionHandler: Send + Sync + 'static {
    /// Dotted identifier used in task definitions, e.g. `repo.remote.update`.
    fn action_type(&self) -> &'static str;

    /// Whether the handler changes repository state. Mutating work is confirmed first.
    fn mutates(&self) -> bool {
        true
    }

    /// Validate options before any repository is touched.
    fn validate_options(&self, _options: &Map<String, Value>) -> Result<(), AppError> {
        Ok(())
    }

    async fn execute(
        &self,
        options: &Map<String, Value>,
        ctx: &ActionContext,
    ) -> Result<ActionOutcome, AppError>;

    /// Runs once after every repository finished.
    async fn finalize(&self) -> Result<Vec<Event>, AppError> {
        Ok(Vec::new())
    }
}

/// Builder used to register handlers before a run.
pub struct ActionRegistryBuilder {
    handlers: BTreeMap<String, Arc<dyn ActionHandler>>,
}

impl Default for ActionRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistryBuilder {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    pub fn register<T: ActionHandler>(&mut self, handler: T) -> &mut Self {
        self.register_arc(Arc::new(handler))
    }

    pub fn register_arc(&mut self, handler: Arc<dyn ActionHandler>) -> &mut Self {
        let name = handler.action_type();
        if self.handlers.contains_key(name) {
            panic!("duplicate action handler registered: {}", name);
        }
        self.handlers.insert(name.to_string(), handler);
        self
    }

    pub fn build(self) -> ActionRegistry {
        ActionRegistry {
            inner: Arc::new(self.handlers),
        }
    }
}

/// Immutable handler lookup shared by all repository workers.
#[derive(Clone)]
pub struct ActionRegistry {
    inner: Arc<BTreeMap<String, Arc<dyn ActionHandler>>>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        ActionRegistryBuilder::new().build()
    }

    pub fn builder() -> ActionRegistryBuilder {
        ActionRegistryBuilder::new()
    }

    pub fn get(&self, action_type: &str) -> Option<Arc<dyn ActionHandler>> {
        self.inner.get(action_type).cloned()
    }

    /// Registered action types in sorted order.
    pub fn action_types(&self) -> Vec<&str> {
        self.inner.keys().map(String::as_str).collect()
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn ActionHandler>> {
        self.inner.values()
    }
}
