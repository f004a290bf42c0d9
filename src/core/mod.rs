pub mod actions;
pub mod config;
pub mod confirm;
pub mod error;
pub mod git;
pub mod operations;
pub mod runtime;
pub mod types;

pub use error::AppError;
pub use types::*;
