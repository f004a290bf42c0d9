//! Task execution across discovered repositories.

pub mod action;
pub mod discovery;
pub mod events;
pub mod executor;
pub mod outcome;
pub mod worktree;

pub use action::{
    ActionContext, ActionHandler, ActionOutcome, ActionRegistry, ActionRegistryBuilder,
    ActionStatus,
};
pub use discovery::{FilesystemDiscoverer, RepositoryDiscoverer};
pub use events::{
    Event, EventKind, EventLevel, EventSink, FanoutEventSink, JsonLinesEventSink,
    MemoryEventSink, TracingEventSink,
};
pub use executor::{execute_operations, execute_tasks, RuntimeDeps};
pub use outcome::{
    ExecutionOutcome, RepositoryOutcome, RepositoryStatus, StageOutcome, SummaryData,
};
pub use worktree::{GitWorktreeInspector, WorktreeInspector, WorktreeStatus};
