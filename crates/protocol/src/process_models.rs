//! Runtime process state models.
//!
//! This module defines the structures for tracking the state of running
//! bulk jobs. A [`Process`] is created when an orchestrator method is invoked
//! and lives in the process registry until shortly after it reaches a
//! terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Identifies which orchestrator (and which job kind) owns a process.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessType {
    Onboarding,
    Offboarding,
    TeamArchive,
    TeamRestore,
    TeamMigration,
    TeamConsolidation,
    SchoolYearTransition,
    HealthCheck,
    HealthRepair,
    Report,
}

impl ProcessType {
    /// Stable label used in logs, audit entries and notifications.
    pub fn label(self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::Offboarding => "offboarding",
            Self::TeamArchive => "team-archive",
            Self::TeamRestore => "team-restore",
            Self::TeamMigration => "team-migration",
            Self::TeamConsolidation => "team-consolidation",
            Self::SchoolYearTransition => "school-year-transition",
            Self::HealthCheck => "health-check",
            Self::HealthRepair => "health-repair",
            Self::Report => "report",
        }
    }
}

impl std::fmt::Display for ProcessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle status of a bulk job.
///
/// A process starts `Running` and moves exactly once to one of the terminal
/// states. It never moves backwards.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessStatus {
    /// Process is actively executing (or waiting for an execution slot).
    Running,

    /// Every attempted item succeeded.
    Completed,

    /// The job ran to its end, but at least one item failed.
    CompletedWithErrors,

    /// An orchestrator-level failure stopped the job.
    Failed,

    /// The job was cancelled on request.
    Cancelled,
}

impl ProcessStatus {
    /// Returns `true` for `Completed`, `CompletedWithErrors`, `Failed` and `Cancelled`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Represents the runtime state of a single bulk job.
#[derive(Serialize, Deserialize, Debug, Clone, TS)]
pub struct Process {
    /// Unique identifier, generated when the process is created and never reused.
    #[ts(type = "string")]
    pub id: Uuid,

    /// Which kind of job this process runs.
    pub process_type: ProcessType,

    /// Current lifecycle status.
    pub status: ProcessStatus,

    #[ts(type = "string")]
    pub started_at: DateTime<Utc>,

    /// Set if and only if `status` is terminal.
    #[ts(type = "string | null")]
    pub completed_at: Option<DateTime<Utc>>,

    pub total_items: usize,
    pub processed_items: usize,
    pub failed_items: usize,

    /// Human-readable phase label, updated as the job progresses.
    pub current_operation: String,

    /// Phase-driven progress (0-100). Item-driven jobs derive it from the counters.
    pub progress_percent: u8,

    /// Identifiers of the entities this job targets. Fixed at creation.
    pub affected_entity_ids: Vec<String>,

    /// Only set when `status` is `Failed`.
    pub error_message: Option<String>,

    /// User who started the job.
    pub initiated_by: String,
}

impl Process {
    /// Items that have not been attempted yet.
    pub fn remaining_items(&self) -> usize {
        self.total_items
            .saturating_sub(self.processed_items + self.failed_items)
    }
}
