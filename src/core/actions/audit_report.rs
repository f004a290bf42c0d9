use crate::core::actions::decode_options;
use crate::core::error::AppError;
use crate::core::git::{GitClient, GitRunner};
use crate::core::operations::task::{action_types, DEFAULT_REMOTE_NAME};
use crate::core::runtime::action::{ActionContext, ActionHandler, ActionOutcome};
use crate::core::runtime::events::Event;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AuditOptions {
    #[serde(default)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AuditRow {
    path: PathBuf,
    origin: String,
    branch: String,
    clean: bool,
}

/// Collects one row per repository and writes them once the run finishes.
///
/// Rows are sorted by path before writing, so the report does not depend on
/// the order repositories completed in.
pub struct AuditReportHandler {
    runner: Arc<dyn GitRunner>,
    rows: Mutex<BTreeMap<Option<PathBuf>, Vec<AuditRow>>>,
}

impl AuditReportHandler {
    pub fn new(runner: Arc<dyn GitRunner>) -> Self {
        Self {
            runner,
            rows: Mutex::new(BTreeMap::new()),
        }
    }

    fn take_rows(&self) -> Result<BTreeMap<Option<PathBuf>, Vec<AuditRow>>, AppError> {
        let mut rows = self.rows.lock().map_err(|_| {
            AppError::new(ErrorCategory::InternalError, "audit rows lock poisoned")
        })?;
        Ok(std::mem::take(&mut *rows))
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn render_csv(rows: &[AuditRow]) -> String {
    let mut out = String::from("path,origin,branch,clean\n");
    for row in rows {
        out.push_str(&format!(
            "{},{},{},{}\n",
            csv_field(&row.path.display().to_string()),
            csv_field(&row.origin),
            csv_field(&row.branch),
            row.clean
        ));
    }
    out
}

async fn write_report(path: &Path, contents: &str) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await.map_err(|err| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to write audit report {}: {}", path.display(), err),
        )
        .with_code("ACT-AUDIT-001")
    })
}

#[async_trait]
impl ActionHandler for AuditReportHandler {
    fn action_type(&self) -> &'static str {
        action_types::AUDIT_REPORT
    }

    fn mutates(&self) -> bool {
        false
    }

    fn validate_options(&self, options: &Map<String, Value>) -> Result<(), AppError> {
        decode_options::<AuditOptions>(self.action_type(), options).map(|_| ())
    }

    async fn execute(
        &self,
        options: &Map<String, Value>,
        ctx: &ActionContext,
    ) -> Result<ActionOutcome, AppError> {
        let opts: AuditOptions = decode_options(self.action_type(), options)?;
        let git = GitClient::new(self.runner.clone(), &ctx.repository);
        let row = AuditRow {
            path: ctx.repository.clone(),
            origin: git
                .remote_url(DEFAULT_REMOTE_NAME)
                .await?
                .unwrap_or_default(),
            branch: git.current_branch().await.unwrap_or_default(),
            clean: git.status_porcelain().await?.is_empty(),
        };

        self.rows
            .lock()
            .map_err(|_| AppError::new(ErrorCategory::InternalError, "audit rows lock poisoned"))?
            .entry(opts.output)
            .or_default()
            .push(row);
        Ok(ActionOutcome::applied("recorded audit row"))
    }

    async fn finalize(&self) -> Result<Vec<Event>, AppError> {
        let mut events = Vec::new();
        for (output, mut rows) in self.take_rows()? {
            rows.sort_by(|a, b| a.path.cmp(&b.path));
            match output {
                Some(path) => {
                    write_report(&path, &render_csv(&rows)).await?;
                    events.push(Event::info(format!(
                        "wrote audit report with {} row(s) to {}",
                        rows.len(),
                        path.display()
                    )));
                }
                None => {
                    for row in rows {
                        events.push(
                            Event::info(format!(
                                "origin={} branch={} clean={}",
                                row.origin, row.branch, row.clean
                            ))
                            .for_repository(&row.path),
                        );
                    }
                }
            }
        }
        Ok(events)
    }
}
