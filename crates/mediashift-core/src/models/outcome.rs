use serde::{Deserialize, Serialize};

/// Terminal result of one record in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// Bytes are at the destination and the row was rewritten.
    Success {
        new_url: String,
        key: String,
        /// True when the destination object already existed and no upload happened.
        reused_existing: bool,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
    /// Dry runs report what would happen without moving bytes or writing rows.
    DryRun {
        planned_url: String,
        key: String,
        exists_at_destination: bool,
    },
}

impl RecordOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RecordOutcome::Success { .. } => "success",
            RecordOutcome::Skipped { .. } => "skipped",
            RecordOutcome::Failed { .. } => "failed",
            RecordOutcome::DryRun { .. } => "dry_run",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RecordOutcome::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RecordOutcome::Failed { .. })
    }
}

/// Run-level status. Partial failure is still a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
    CompletedWithErrors,
}

impl RunStatus {
    pub fn from_failed_count(failed: usize) -> Self {
        if failed == 0 {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithErrors
        }
    }
}

/// Aggregate counters of a ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total: usize,
    pub processed: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// What a finished run reports back to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub migration_id: String,
    pub status: RunStatus,
    pub dry_run: bool,
    /// Counters of the whole ledger, including earlier runs.
    pub stats: RunStats,
    /// Records attempted in this invocation.
    pub attempted: usize,
    pub uploads: usize,
    pub reused: usize,
    /// Records a dry run would migrate.
    pub planned: usize,
}
