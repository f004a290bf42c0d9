use crate::core::actions::{decode_options, default_remote_name, load_remote};
use crate::core::error::AppError;
use crate::core::git::{GitClient, GitRunner, RemoteProtocol};
use crate::core::operations::task::action_types;
use crate::core::runtime::action::{ActionContext, ActionHandler, ActionOutcome};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConvertProtocolOptions {
    from: RemoteProtocol,
    to: RemoteProtocol,
    #[serde(default = "default_remote_name")]
    remote_name: String,
}

/// Switches remotes from one transport to another, e.g. https to ssh.
pub struct ConvertProtocolHandler {
    runner: Arc<dyn GitRunner>,
}

impl ConvertProtocolHandler {
    pub fn new(runner: Arc<dyn GitRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ActionHandler for ConvertProtocolHandler {
    fn action_type(&self) -> &'static str {
        action_types::CONVERT_PROTOCOL
    }

    fn validate_options(&self, options: &Map<String, Value>) -> Result<(), AppError> {
        decode_options::<ConvertProtocolOptions>(self.action_type(), options).map(|_| ())
    }

    async fn execute(
        &self,
        options: &Map<String, Value>,
        ctx: &ActionContext,
    ) -> Result<ActionOutcome, AppError> {
        let opts: ConvertProtocolOptions = decode_options(self.action_type(), options)?;
        let git = GitClient::new(self.runner.clone(), &ctx.repository);
        let (current, remote) = match load_remote(&git, &opts.remote_name).await? {
            Ok(found) => found,
            Err(skipped) => return Ok(skipped),
        };

        if remote.protocol != opts.from {
            return Ok(ActionOutcome::skipped(format!(
                "remote uses {}, not {}",
                remote.protocol, opts.from
            )));
        }
        let converted = remote.render(opts.to);
        if converted == current {
            return Ok(ActionOutcome::skipped(format!("remote already uses {}", opts.to)));
        }
        if ctx.dry_run {
            return Ok(ActionOutcome::planned(format!(
                "would convert {} to {}",
                opts.remote_name, converted
            )));
        }
        git.set_remote_url(&opts.remote_name, &converted).await?;
        Ok(ActionOutcome::applied(format!(
            "converted {} from {} to {}",
            opts.remote_name, opts.from, opts.to
        )))
    }
}
