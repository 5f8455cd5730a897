//! Work items and options accepted by the bulk orchestrators.
//!
//! Every orchestrator receives a list of work items plus a shared
//! [`BulkOperationOptions`] value and the [`AuthContext`] of the caller.

use crate::entity_models::{NewSchoolYear, NewTeam, NewUser};
use crate::result_models::BulkOperationResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

/// Knobs controlling how a bulk job walks through its items.
///
/// # Example
///
/// ```yaml
/// batch_size: 25
/// continue_on_error: true
/// acceptable_error_percentage: 20
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(default)]
pub struct BulkOperationOptions {
    /// Number of items processed between two cancellation/threshold checks.
    pub batch_size: usize,

    /// Keep going after the first failed item.
    pub continue_on_error: bool,

    /// Stop once the running error rate (percent) exceeds this value.
    pub acceptable_error_percentage: f64,

    /// Simulate the job without mutating anything (team archive).
    pub dry_run: bool,

    /// Tell team owners before their team is archived.
    pub notify_owners: bool,

    /// Run the post-archive cleanup sub-steps.
    pub cleanup_after_archive: bool,
}

impl Default for BulkOperationOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            continue_on_error: true,
            acceptable_error_percentage: 100.0,
            dry_run: false,
            notify_owners: false,
            cleanup_after_archive: true,
        }
    }
}

/// Identity of the caller that started a job.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct AuthContext {
    pub user_id: String,
    pub display_name: String,
}

impl AuthContext {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }

    /// Identity used for jobs started by the platform itself.
    pub fn system() -> Self {
        Self::new("system", "System")
    }
}

/// One user to create in the directory.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct OnboardingPlan {
    pub user: NewUser,
    #[serde(default)]
    pub team_ids: Vec<String>,
    #[serde(default)]
    pub subject_ids: Vec<String>,
}

/// One user to remove from the directory.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct OffboardingPlan {
    pub user_id: String,
    /// Receives ownership of every team the departing user owns.
    #[serde(default)]
    pub fallback_owner_id: Option<String>,
    #[serde(default = "default_true")]
    pub backup_data: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct TeamRestoreRequest {
    pub team_id: String,
    /// Owner the restored team is handed to.
    pub owner_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct TeamMigration {
    pub team_id: String,
    pub target_school_year_id: String,
    #[serde(default)]
    pub new_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct TeamConsolidation {
    pub target_team_id: String,
    pub source_team_ids: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct SchoolYearTransitionRequest {
    pub from_school_year_id: String,
    pub new_school_year: NewSchoolYear,
    /// Teams to create in the new school year.
    #[serde(default)]
    pub team_templates: Vec<NewTeam>,
}

/// Part of the platform checked by the health monitor.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "kebab-case")]
pub enum SystemComponent {
    Database,
    DirectoryApi,
    DirectorySync,
    Cache,
    NotificationService,
    AuditLog,
}

impl SystemComponent {
    pub fn all() -> Vec<Self> {
        vec![
            Self::Database,
            Self::DirectoryApi,
            Self::DirectorySync,
            Self::Cache,
            Self::NotificationService,
            Self::AuditLog,
        ]
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::DirectoryApi => "directory-api",
            Self::DirectorySync => "directory-sync",
            Self::Cache => "cache",
            Self::NotificationService => "notification-service",
            Self::AuditLog => "audit-log",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct ComponentHealth {
    pub component: SystemComponent,
    pub status: HealthStatus,
    pub duration_ms: u64,
    pub message: String,
}

/// Outcome of a health check run, including generated recommendations.
#[derive(Serialize, Deserialize, Debug, Clone, TS)]
pub struct HealthReport {
    pub result: BulkOperationResult,
    pub overall: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub recommendations: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    UserDirectory,
    TeamOverview,
    DepartmentSummary,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Yaml,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct ReportRequest {
    pub name: String,
    pub kind: ReportKind,
    #[serde(default)]
    pub format: ExportFormat,
    /// Equality filters applied to report rows (`field -> value`).
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}
