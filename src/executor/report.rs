// ============================================================================
// File: packages/adles/src/executor/report.rs
// ----------------------------------------------------------------------------
// Run report: per-operation results and summary counts
// ============================================================================

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::types::{OperationStatus, Phase, SkipReason};

/// Outcome of one operation
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult {
    pub id: usize,
    pub kind: &'static str,
    pub description: String,

    /// Specification path the operation came from
    pub origin: String,
    pub status: OperationStatus,
}

/// Outcome counts of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,

    /// Skipped operations of the running phase
    pub skipped: usize,

    /// Operations belonging to other phases
    pub not_applicable: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} skipped",
            self.succeeded, self.failed, self.skipped
        )
    }
}

/// Result of executing one phase
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub phase: Phase,
    pub environment: String,
    pub driver: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    pub results: Vec<OperationResult>,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for result in &self.results {
            match &result.status {
                OperationStatus::Succeeded => summary.succeeded += 1,
                OperationStatus::Failed(_) => summary.failed += 1,
                OperationStatus::Skipped(SkipReason::PhaseMismatch) => {
                    summary.not_applicable += 1
                }
                OperationStatus::Skipped(_) => summary.skipped += 1,
                // never left behind by a finished run
                OperationStatus::Pending | OperationStatus::InProgress => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn failures(&self) -> impl Iterator<Item = &OperationResult> {
        self.results.iter().filter(|r| r.status.is_failed())
    }

    /// No failures and not cancelled
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failures().next().is_none()
    }

    /// Results skipped for `reason`
    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == OperationStatus::Skipped(reason))
            .count()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Human-readable report: failures, then the summary line
    pub fn render(&self) -> String {
        let mut out = String::new();
        for failure in self.failures() {
            out.push_str(&format!(
                "FAILED {} ({}): {}\n",
                failure.description, failure.origin, failure.status
            ));
        }
        out.push_str(&format!(
            "{} of {} [{}]: {} in {:.1}s{}\n",
            self.phase,
            self.environment,
            self.run_id,
            self.summary(),
            self.duration().num_milliseconds() as f64 / 1000.0,
            if self.cancelled { " (cancelled)" } else { "" }
        ));
        out
    }
}
