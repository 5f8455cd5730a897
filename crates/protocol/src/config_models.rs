//! Configuration models for the `.bulk-kit/` directory.
//!
//! This module defines the structure of the global configuration file that
//! controls engine-wide settings (default job options, the size of each
//! orchestrator's concurrency gate, status retention and health thresholds)
//! and of the job files stored under `.bulk-kit/jobs/`.

use crate::job_models::{
    BulkOperationOptions, OffboardingPlan, OnboardingPlan, ReportRequest,
    SchoolYearTransitionRequest, SystemComponent, TeamConsolidation, TeamMigration,
    TeamRestoreRequest,
};
use crate::process_models::ProcessType;
use serde::Deserialize;
use serde::Serialize;
use ts_rs::TS;

/// Represents global settings from `.bulk-kit/config.toml`.
///
/// # Example
///
/// ```toml
/// # .bulk-kit/config.toml
/// retention_secs = 300
///
/// [defaults]
/// batch_size = 20
///
/// [gates]
/// onboarding = 3
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct GlobalConfig {
    /// Options applied when a job file does not override them.
    #[serde(default)]
    pub defaults: BulkOperationOptions,

    #[serde(default)]
    pub gates: GateConfig,

    /// How long a finished process stays visible to status polls.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    #[serde(default)]
    pub health: HealthConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            defaults: BulkOperationOptions::default(),
            gates: GateConfig::default(),
            retention_secs: default_retention_secs(),
            health: HealthConfig::default(),
        }
    }
}

/// Number of jobs each orchestrator may run at the same time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(default)]
pub struct GateConfig {
    pub onboarding: usize,
    pub lifecycle: usize,
    pub school_year: usize,
    pub health: usize,
    pub reporting: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            onboarding: 3,
            lifecycle: 2,
            school_year: 2,
            health: 3,
            reporting: 2,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(default)]
pub struct HealthConfig {
    /// Checks slower than this are reported as degraded.
    pub degraded_threshold_ms: u64,

    /// Checks still running after this are reported as unhealthy.
    pub check_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_threshold_ms: 2_000,
            check_timeout_ms: 10_000,
        }
    }
}

fn default_retention_secs() -> u64 {
    300
}

/// A saved bulk job from `.bulk-kit/jobs/*.yaml`.
///
/// # Example
///
/// ```yaml
/// name: archive-2023
/// description: Archive last year's class teams
/// options:
///   batch_size: 5
///   notify_owners: true
/// job:
///   operation: archive-teams
///   items: [team-1a, team-1b]
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct JobDefinition {
    pub name: String,

    #[serde(default)]
    #[ts(optional)]
    pub description: Option<String>,

    /// Replaces the `[defaults]` of `config.toml` when present.
    #[serde(default)]
    #[ts(optional)]
    pub options: Option<BulkOperationOptions>,

    pub job: JobSpec,
}

/// Operation and work items of a [`JobDefinition`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(tag = "operation", content = "items", rename_all = "kebab-case")]
pub enum JobSpec {
    Onboarding(Vec<OnboardingPlan>),
    Offboarding(Vec<OffboardingPlan>),
    ArchiveTeams(Vec<String>),
    RestoreTeams(Vec<TeamRestoreRequest>),
    MigrateTeams(Vec<TeamMigration>),
    ConsolidateTeams(Vec<TeamConsolidation>),
    SchoolYearTransition(SchoolYearTransitionRequest),
    HealthCheck(Vec<SystemComponent>),
    HealthRepair(Vec<SystemComponent>),
    Report(ReportRequest),
}

impl JobSpec {
    pub fn process_type(&self) -> ProcessType {
        match self {
            Self::Onboarding(_) => ProcessType::Onboarding,
            Self::Offboarding(_) => ProcessType::Offboarding,
            Self::ArchiveTeams(_) => ProcessType::TeamArchive,
            Self::RestoreTeams(_) => ProcessType::TeamRestore,
            Self::MigrateTeams(_) => ProcessType::TeamMigration,
            Self::ConsolidateTeams(_) => ProcessType::TeamConsolidation,
            Self::SchoolYearTransition(_) => ProcessType::SchoolYearTransition,
            Self::HealthCheck(_) => ProcessType::HealthCheck,
            Self::HealthRepair(_) => ProcessType::HealthRepair,
            Self::Report(_) => ProcessType::Report,
        }
    }

    /// Number of work items in the job.
    pub fn item_count(&self) -> usize {
        match self {
            Self::Onboarding(items) => items.len(),
            Self::Offboarding(items) => items.len(),
            Self::ArchiveTeams(items) => items.len(),
            Self::RestoreTeams(items) => items.len(),
            Self::MigrateTeams(items) => items.len(),
            Self::ConsolidateTeams(items) => items.len(),
            Self::SchoolYearTransition(request) => request.team_templates.len(),
            Self::HealthCheck(items) | Self::HealthRepair(items) => items.len(),
            Self::Report(_) => 1,
        }
    }
}
