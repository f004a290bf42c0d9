//! Operations documents: decoding, dependency ordering and task translation.

pub mod dot;
pub mod error;
pub mod planner;
pub mod schema;
pub mod task;
pub mod translate;

pub use error::PlanError;
pub use planner::order_operations;
pub use schema::{Operation, OperationNode, OperationsDocument};
pub use task::{RuntimeOptions, TaskDefinition};
pub use translate::{compile_plan, translate_operations, TranslatedPlan};
