use crate::core::actions::{decode_options, default_remote_name, load_remote};
use crate::core::error::AppError;
use crate::core::git::{GitClient, GitRunner};
use crate::core::operations::task::action_types;
use crate::core::runtime::action::{ActionContext, ActionHandler, ActionOutcome};
use crate::core::runtime::events::Event;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RemoteUpdateOptions {
    #[serde(default)]
    owner: Option<String>,
    #[serde(default = "default_remote_name")]
    remote_name: String,
}

/// Rewrites a remote URL into its canonical `host/owner/repository.git` form.
pub struct RemoteUpdateHandler {
    runner: Arc<dyn GitRunner>,
}

impl RemoteUpdateHandler {
    pub fn new(runner: Arc<dyn GitRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ActionHandler for RemoteUpdateHandler {
    fn action_type(&self) -> &'static str {
        action_types::REMOTE_UPDATE
    }

    fn validate_options(&self, options: &Map<String, Value>) -> Result<(), AppError> {
        decode_options::<RemoteUpdateOptions>(self.action_type(), options).map(|_| ())
    }

    async fn execute(
        &self,
        options: &Map<String, Value>,
        ctx: &ActionContext,
    ) -> Result<ActionOutcome, AppError> {
        let opts: RemoteUpdateOptions = decode_options(self.action_type(), options)?;
        let git = GitClient::new(self.runner.clone(), &ctx.repository);
        let (current, remote) = match load_remote(&git, &opts.remote_name).await? {
            Ok(found) => found,
            Err(skipped) => return Ok(skipped),
        };

        if let Some(owner) = opts.owner.as_deref().filter(|o| !o.trim().is_empty()) {
            if !remote.owner_matches(owner) {
                return Ok(ActionOutcome::skipped(format!(
                    "remote owner '{}' does not match '{}'",
                    remote.owner, owner
                ))
                .with_event(Event::warn(format!(
                    "skipping {}: owned by '{}', expected '{}'",
                    current, remote.owner, owner
                ))));
            }
        }

        let canonical = remote.canonical();
        if canonical == current {
            return Ok(ActionOutcome::skipped("remote already canonical"));
        }
        if ctx.dry_run {
            return Ok(ActionOutcome::planned(format!(
                "would set {} to {}",
                opts.remote_name, canonical
            )));
        }
        git.set_remote_url(&opts.remote_name, &canonical).await?;
        Ok(ActionOutcome::applied(format!(
            "set {} from {} to {}",
            opts.remote_name, current, canonical
        )))
    }
}
