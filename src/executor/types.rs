// ============================================================================
// File: packages/adles/src/executor/types.rs
// ----------------------------------------------------------------------------
// Phase, operation status and cancellation types
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::plan::Applicability;

/// Execution phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Create master folders, networks and master services
    Masters,

    /// Create the deployed environment, cloning from masters
    Deploy,

    /// Remove what the masters phase created
    CleanupMasters,

    /// Remove what the deploy phase created
    CleanupEnvironment,
}

impl Phase {
    /// Whether operations of `applicability` run in this phase
    pub fn applies(self, applicability: Applicability) -> bool {
        match self {
            Phase::Masters => applicability.in_masters(),
            Phase::Deploy => applicability.in_deploy(),
            Phase::CleanupMasters => applicability == Applicability::MasterOnly,
            Phase::CleanupEnvironment => applicability == Applicability::DeployOnly,
        }
    }

    pub fn is_cleanup(self) -> bool {
        matches!(self, Phase::CleanupMasters | Phase::CleanupEnvironment)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Masters => "masters",
            Phase::Deploy => "deploy",
            Phase::CleanupMasters => "cleanup-masters",
            Phase::CleanupEnvironment => "cleanup-environment",
        };
        f.write_str(name)
    }
}

/// Why an operation was not executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Operation does not belong to the running phase
    PhaseMismatch,

    /// An ancestor failed
    ParentFailed,

    /// A permission or network of the enclosing folder failed
    PrerequisiteFailed,

    /// The run was cancelled before the operation started
    Cancelled,

    /// Network cleanup is disabled
    NetworksRetained,

    /// The operation leaves nothing behind to remove
    NothingToUndo,

    /// Cleanup of a contained operation failed
    DependentFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::PhaseMismatch => "phase-mismatch",
            SkipReason::ParentFailed => "parent-failed",
            SkipReason::PrerequisiteFailed => "prerequisite-failed",
            SkipReason::Cancelled => "cancelled",
            SkipReason::NetworksRetained => "networks-retained",
            SkipReason::NothingToUndo => "nothing-to-undo",
            SkipReason::DependentFailed => "dependent-failed",
        };
        f.write_str(reason)
    }
}

/// Status of one operation within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "kebab-case")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed(String),
    Skipped(SkipReason),
}

impl OperationStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, OperationStatus::Failed(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, OperationStatus::Pending)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStatus::Pending => f.write_str("pending"),
            OperationStatus::InProgress => f.write_str("in progress"),
            OperationStatus::Succeeded => f.write_str("succeeded"),
            OperationStatus::Failed(reason) => write!(f, "failed: {reason}"),
            OperationStatus::Skipped(reason) => write!(f, "skipped ({reason})"),
        }
    }
}

/// Cooperative cancellation flag shared between a run and its trigger
///
/// Tripping the token stops new operations from starting. Operations
/// already talking to the platform finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            log::warn!("cancellation requested, waiting for in-flight operations");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
