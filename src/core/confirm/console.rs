use crate::core::confirm::{ConfirmationResult, Prompter};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use std::io::{self, Write};
use tokio::task::spawn_blocking;

/// Asks on stderr and reads answers from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompter;

impl ConsolePrompter {
    pub fn new() -> Self {
        Self
    }
}

/// Read one line from stdin. `None` means end of input.
async fn read_line_blocking() -> Result<Option<String>, AppError> {
    spawn_blocking(|| {
        let mut buffer = String::new();
        let read = io::stdin().read_line(&mut buffer).map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to read stdin: {}", err),
            )
        })?;
        Ok((read > 0).then_some(buffer))
    })
    .await
    .map_err(|err| {
        AppError::new(
            ErrorCategory::PromptError,
            format!("console input task cancelled: {}", err),
        )
    })?
}

/// Interpret a console answer. `None` asks again.
pub(crate) fn parse_answer(line: &str) -> Option<ConfirmationResult> {
    match line.trim().to_lowercase().as_str() {
        "" | "n" | "no" => Some(ConfirmationResult::no()),
        "y" | "yes" => Some(ConfirmationResult::yes()),
        "a" | "all" => Some(ConfirmationResult::all()),
        _ => None,
    }
}

#[async_trait]
impl Prompter for ConsolePrompter {
    fn prompter_type(&self) -> &'static str {
        "console"
    }

    async fn confirm(&self, prompt: &str) -> Result<ConfirmationResult, AppError> {
        loop {
            eprint!("{} [y/N/a]: ", prompt);
            io::stderr().flush().ok();
            let Some(line) = read_line_blocking().await? else {
                return Ok(ConfirmationResult::no());
            };
            match parse_answer(&line) {
                Some(result) => return Ok(result),
                None => println!("Please respond with 'y', 'n' or 'a' (apply to all)."),
            }
        }
    }
}
