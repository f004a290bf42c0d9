use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Per-task tallies across all repositories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    pub name: String,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryOutcome {
    pub path: PathBuf,
    pub status: RepositoryStatus,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Final location when a task moved the repository during the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relocated_to: Option<PathBuf>,
}

impl RepositoryOutcome {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            status: RepositoryStatus::Skipped,
            applied: 0,
            skipped: 0,
            failed: 0,
            error: None,
            relocated_to: None,
        }
    }

    /// Derive the final status from the counters.
    pub fn settle(&mut self) {
        self.status = if self.failed > 0 {
            RepositoryStatus::Failed
        } else if self.applied > 0 {
            RepositoryStatus::Succeeded
        } else {
            RepositoryStatus::Skipped
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummaryData {
    pub succeeded_repositories: usize,
    pub failed_repositories: usize,
    pub skipped_repositories: usize,
    pub warning_events: usize,
    pub error_events: usize,
    pub applied_actions: usize,
    pub skipped_actions: usize,
}

/// Aggregated result of running a task list across repositories.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub run_id: Uuid,
    pub repository_count: usize,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub stage_outcomes: Vec<StageOutcome>,
    pub repositories: Vec<RepositoryOutcome>,
    pub summary: SummaryData,
    pub cancelled: bool,
}

impl ExecutionOutcome {
    pub fn has_failures(&self) -> bool {
        self.summary.failed_repositories > 0
    }

    /// One-line human summary.
    pub fn summary_line(&self) -> String {
        format!(
            "{} repositories in {}: {} succeeded, {} failed, {} skipped ({} warnings, {} errors){}",
            self.repository_count,
            humantime::format_duration(Duration::from_millis(self.duration.as_millis() as u64)),
            self.summary.succeeded_repositories,
            self.summary.failed_repositories,
            self.summary.skipped_repositories,
            self.summary.warning_events,
            self.summary.error_events,
            if self.cancelled { " [cancelled]" } else { "" }
        )
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}
