#![allow(clippy::result_large_err)] // Option decoding returns AppError so preflight can report the failing action.

//! Built-in action handlers. Every handler talks to git through a [`GitRunner`].

pub mod audit_report;
pub mod branch_default;
pub mod convert_protocol;
pub mod files_apply;
pub mod folder_rename;
pub mod remote_update;

pub use audit_report::AuditReportHandler;
pub use branch_default::BranchDefaultHandler;
pub use convert_protocol::ConvertProtocolHandler;
pub use files_apply::FilesApplyHandler;
pub use folder_rename::FolderRenameHandler;
pub use remote_update::RemoteUpdateHandler;

use crate::core::error::AppError;
use crate::core::git::{GitClient, GitRunner, RemoteUrl};
use crate::core::runtime::action::{ActionOutcome, ActionRegistryBuilder};
use crate::core::runtime::events::Event;
use crate::core::types::ErrorCategory;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Register every built-in handler, all sharing `runner`.
pub fn register_builtins(builder: &mut ActionRegistryBuilder, runner: Arc<dyn GitRunner>) {
    builder
        .register(RemoteUpdateHandler::new(runner.clone()))
        .register(ConvertProtocolHandler::new(runner.clone()))
        .register(FolderRenameHandler::new(runner.clone()))
        .register(BranchDefaultHandler::new(runner.clone()))
        .register(AuditReportHandler::new(runner.clone()))
        .register(FilesApplyHandler::new(runner));
}

/// Decode an option map into a handler's typed options.
pub(crate) fn decode_options<T: DeserializeOwned>(
    action_type: &str,
    options: &Map<String, Value>,
) -> Result<T, AppError> {
    serde_json::from_value(Value::Object(options.clone())).map_err(|err| {
        AppError::new(
            ErrorCategory::ValidationError,
            format!("invalid options for {}: {}", action_type, err),
        )
        .with_code("ACT-OPTIONS-001")
        .with_context("action", action_type)
    })
}

/// Fetch and parse a remote, or explain why the repository is skipped.
pub(crate) async fn load_remote(
    git: &GitClient,
    remote_name: &str,
) -> Result<Result<(String, RemoteUrl), ActionOutcome>, AppError> {
    let Some(raw) = git.remote_url(remote_name).await? else {
        return Ok(Err(ActionOutcome::skipped(format!(
            "no remote named '{}'",
            remote_name
        ))));
    };
    match RemoteUrl::parse(&raw) {
        Some(remote) => Ok(Ok((raw, remote))),
        None => Ok(Err(ActionOutcome::skipped(format!(
            "remote '{}' is not a hosted repository URL",
            remote_name
        ))
        .with_event(Event::warn(format!("cannot parse remote URL '{}'", raw))))),
    }
}

fn default_remote_name() -> String {
    crate::core::operations::task::DEFAULT_REMOTE_NAME.to_string()
}
