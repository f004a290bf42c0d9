//! Lowering of typed operations into primitive task definitions.

use crate::core::operations::error::PlanError;
use crate::core::operations::planner::order_operations;
use crate::core::operations::schema::{
    AuditOperation, Operation, OperationNode, PromoteOperation, ProtocolConversionOperation,
    RemoteUpdateOperation, RenameOperation,
};
use crate::core::operations::task::{
    action_types, RuntimeOptions, TaskDefinition, DEFAULT_REMOTE_NAME,
};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Ordered tasks plus the runtime requirements accumulated while translating.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatedPlan {
    pub tasks: Vec<TaskDefinition>,
    pub runtime: RuntimeOptions,
}

/// Order `nodes` and translate the result in one step.
pub fn compile_plan(nodes: &[OperationNode]) -> Result<TranslatedPlan, PlanError> {
    let ordered = order_operations(nodes)?;
    translate_operations(&ordered)
}

/// Translate already ordered nodes. Task order follows node order.
pub fn translate_operations(nodes: &[OperationNode]) -> Result<TranslatedPlan, PlanError> {
    let mut runtime = RuntimeOptions::default();
    let mut tasks = Vec::new();

    for node in nodes {
        let name = node.display_name();
        match &node.operation {
            Operation::Tasks(bundle) => {
                if bundle.tasks.is_empty() {
                    return Err(PlanError::EmptyTaskBundle {
                        operation: name.to_string(),
                    });
                }
                tasks.extend(bundle.tasks.iter().cloned());
            }
            Operation::RemoteUpdate(op) => tasks.push(remote_update_task(op)),
            Operation::ProtocolConversion(op) => tasks.push(protocol_task(op)),
            Operation::RenameDirectories(op) => {
                tasks.push(rename_task(op));
                runtime.merge_requirements(&rename_requirements(op));
            }
            Operation::PromoteBranch(op) => tasks.push(promote_task(name, op)?),
            Operation::AuditReport(op) => tasks.push(audit_task(op)),
        }
    }

    Ok(TranslatedPlan { tasks, runtime })
}

fn options(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn remote_update_task(op: &RemoteUpdateOperation) -> TaskDefinition {
    let mut opts = Map::new();
    if let Some(owner) = op.owner.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
        opts.insert("owner".into(), json!(owner));
    }
    TaskDefinition::new("update canonical remotes").with_action(action_types::REMOTE_UPDATE, opts)
}

fn protocol_task(op: &ProtocolConversionOperation) -> TaskDefinition {
    TaskDefinition::new("convert remote protocol").with_action(
        action_types::CONVERT_PROTOCOL,
        options([("from", json!(op.from)), ("to", json!(op.to))]),
    )
}

fn rename_task(op: &RenameOperation) -> TaskDefinition {
    TaskDefinition::new("rename directories")
        .with_ensure_clean(op.require_clean)
        .with_action(
            action_types::FOLDER_RENAME,
            options([
                ("require_clean", json!(op.require_clean)),
                ("include_owner", json!(op.include_owner)),
            ]),
        )
}

/// Renames move directories, so nested repositories must be visited deepest first.
fn rename_requirements(op: &RenameOperation) -> RuntimeOptions {
    RuntimeOptions {
        include_nested_repositories: true,
        process_repositories_by_descending_depth: true,
        capture_initial_worktree_status: op.require_clean,
        ..RuntimeOptions::default()
    }
}

fn promote_task(name: &str, op: &PromoteOperation) -> Result<TaskDefinition, PlanError> {
    let target = match op.targets.as_slice() {
        [target] => target,
        targets => {
            return Err(PlanError::BranchTargetCount {
                operation: name.to_string(),
                count: targets.len(),
            })
        }
    };

    let remote = target
        .remote_name
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REMOTE_NAME);
    let mut opts = options([
        ("target_branch", json!(target.target_branch)),
        ("remote_name", json!(remote)),
        ("push_to_remote", json!(target.push_to_remote)),
        ("delete_source_branch", json!(target.delete_source_branch)),
    ]);
    if let Some(source) = &target.source_branch {
        opts.insert("source_branch".into(), json!(source));
    }
    Ok(TaskDefinition::new("promote default branch").with_action(action_types::BRANCH_DEFAULT, opts))
}

fn audit_task(op: &AuditOperation) -> TaskDefinition {
    let mut opts = Map::new();
    if let Some(output) = &op.output {
        opts.insert("output".into(), json!(output.display().to_string()));
    }
    TaskDefinition::new("generate audit report").with_action(action_types::AUDIT_REPORT, opts)
}
