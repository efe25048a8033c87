//! Result aggregation and the per-run JSON artifact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatch::outcome::DispatchOutcome;
use crate::error::{DispatchError, ReportError};
use crate::filter::SelectionStats;

/// One failed record in the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    pub record_id: i64,
    pub case_id: String,
    pub error: String,
}

/// Counts and failures of one run. Emitted once, at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub details: Vec<FailureDetail>,
}

/// Running totals, updated as each record completes.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    result: BatchResult,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record's result into the totals.
    pub fn record(
        &mut self,
        record_id: i64,
        case_id: &str,
        result: &Result<DispatchOutcome, DispatchError>,
    ) {
        self.result.total += 1;
        let error = match result {
            Ok(outcome) if outcome.status.is_success() => {
                self.result.success_count += 1;
                return;
            }
            Ok(outcome) => outcome
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
            Err(e) => e.to_string(),
        };
        self.result.error_count += 1;
        self.result.details.push(FailureDetail {
            record_id,
            case_id: case_id.to_string(),
            error,
        });
    }

    /// Totals so far.
    #[cfg(test)]
    fn current(&self) -> &BatchResult {
        &self.result
    }

    pub fn finish(self) -> BatchResult {
        self.result
    }
}

/// Everything persisted about a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub force_send: bool,
    pub selection: SelectionStats,
    /// Set when the records could not be fetched; the run then processed nothing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
    #[serde(flatten)]
    pub result: BatchResult,
}

impl RunReport {
    /// Artifact file name, stamped with the run start time.
    pub fn file_name(&self) -> String {
        format!("results-{}.json", self.started_at.format("%Y%m%d-%H%M%S"))
    }

    /// Log the run summary.
    pub fn log_summary(&self) {
        info!(
            run_id = %self.run_id,
            total = self.result.total,
            success = self.result.success_count,
            errors = self.result.error_count,
            dry_run = self.dry_run,
            "Batch finished"
        );
        if self.result.error_count > 0 {
            warn!(errors = self.result.error_count, "Some records failed");
            for detail in &self.result.details {
                warn!(
                    record_id = detail.record_id,
                    case_id = %detail.case_id,
                    error = %detail.error,
                    "Failed record"
                );
            }
        }
    }

    /// Write the report as pretty JSON into `dir`, creating it if needed.
    pub async fn write_artifact(&self, dir: &Path) -> Result<PathBuf, ReportError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, json).await?;
        info!(path = %path.display(), "Results saved");
        Ok(path)
    }
}
