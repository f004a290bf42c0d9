//! Confirmation prompts and the run-wide "apply to all" memory.

pub mod console;

pub use console::ConsolePrompter;

use crate::core::error::AppError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Answer to a confirmation prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfirmationResult {
    pub confirmed: bool,
    pub apply_to_all: bool,
}

impl ConfirmationResult {
    pub fn yes() -> Self {
        Self {
            confirmed: true,
            apply_to_all: false,
        }
    }

    pub fn all() -> Self {
        Self {
            confirmed: true,
            apply_to_all: true,
        }
    }

    pub fn no() -> Self {
        Self::default()
    }
}

/// Source of yes/no answers for mutating work.
#[async_trait]
pub trait Prompter: Send + Sync + 'static {
    /// Human-friendly identifier used in logs.
    fn prompter_type(&self) -> &'static str;

    async fn confirm(&self, prompt: &str) -> Result<ConfirmationResult, AppError>;
}

/// Prompter for runs without a terminal. Every prompt is declined.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractivePrompter;

#[async_trait]
impl Prompter for NonInteractivePrompter {
    fn prompter_type(&self) -> &'static str {
        "non-interactive"
    }

    async fn confirm(&self, prompt: &str) -> Result<ConfirmationResult, AppError> {
        tracing::warn!(prompt, "declining confirmation: no interactive terminal (use --yes)");
        Ok(ConfirmationResult::no())
    }
}

/// Wraps a base prompter and remembers an "apply to all" answer for the rest of the run.
///
/// Once `assume_yes` is set it never clears. Prompts to the base are serialized
/// so concurrent repository workers never interleave questions.
pub struct ConfirmationCascade {
    base: Option<Arc<dyn Prompter>>,
    assume_yes: AtomicBool,
    gate: Mutex<()>,
}

impl ConfirmationCascade {
    pub fn new(base: Option<Arc<dyn Prompter>>, assume_yes: bool) -> Self {
        Self {
            base,
            assume_yes: AtomicBool::new(assume_yes),
            gate: Mutex::new(()),
        }
    }

    /// Cascade that confirms everything without asking.
    pub fn assume_yes_always() -> Self {
        Self::new(None, true)
    }

    pub fn assume_yes(&self) -> bool {
        self.assume_yes.load(Ordering::SeqCst)
    }

    pub async fn confirm(&self, prompt: &str) -> Result<ConfirmationResult, AppError> {
        if self.assume_yes() {
            return Ok(ConfirmationResult::all());
        }
        let Some(base) = &self.base else {
            return Ok(ConfirmationResult::default());
        };

        let _guard = self.gate.lock().await;
        // another worker may have answered "all" while this one waited
        if self.assume_yes() {
            return Ok(ConfirmationResult::all());
        }
        let result = base.confirm(prompt).await?;
        if result.apply_to_all {
            self.assume_yes.store(true, Ordering::SeqCst);
            tracing::info!(prompter = base.prompter_type(), "apply to all selected; remaining prompts skipped");
        }
        Ok(result)
    }
}
