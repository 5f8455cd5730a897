//! Traits for the external systems the orchestrators call into.
//!
//! The engine never talks to the remote directory, the notification service
//! or the audit store directly; it goes through these traits so that the
//! integrations (with their own retry and circuit-breaking) can be swapped
//! for in-memory doubles in tests and in the sandbox runner.

use async_trait::async_trait;
use bk_protocol::entity_models::{
    Department, MemberRole, NewSchoolYear, NewTeam, NewUser, SchoolYear, Subject, Team,
    TeamState, User,
};
use bk_protocol::ipc::NotificationSeverity;
use bk_protocol::job_models::{ExportFormat, SystemComponent};
use bk_protocol::process_models::{ProcessStatus, ProcessType};
use bk_protocol::result_models::EntityRef;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Request rejected: {0}")]
    Rejected(String),
    #[error("Timed out after {0} ms")]
    Timeout(u64),
}

impl CollaboratorError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }
}

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Entity services backed by the remote collaboration directory.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Cheap reachability check used before a job touches any item.
    async fn ping(&self) -> CollaboratorResult<()>;

    async fn get_user(&self, id: &str) -> CollaboratorResult<Option<User>>;
    async fn find_user_by_upn(&self, upn: &str) -> CollaboratorResult<Option<User>>;
    async fn list_users(&self) -> CollaboratorResult<Vec<User>>;
    async fn create_user(&self, user: NewUser) -> CollaboratorResult<User>;
    /// Deactivate (`false`) or re-activate (`true`) a user account.
    async fn set_user_active(&self, id: &str, active: bool) -> CollaboratorResult<User>;
    async fn assign_subject(&self, user_id: &str, subject_id: &str) -> CollaboratorResult<()>;
    /// Back up the user's mailbox and files; returns the backup location.
    async fn backup_user_data(&self, user_id: &str) -> CollaboratorResult<String>;

    async fn get_department(&self, id: &str) -> CollaboratorResult<Option<Department>>;
    async fn list_departments(&self) -> CollaboratorResult<Vec<Department>>;
    async fn get_subject(&self, id: &str) -> CollaboratorResult<Option<Subject>>;

    async fn get_team(&self, id: &str) -> CollaboratorResult<Option<Team>>;
    async fn list_teams(&self) -> CollaboratorResult<Vec<Team>>;
    async fn create_team(&self, team: NewTeam) -> CollaboratorResult<Team>;
    async fn update_team(&self, team: Team) -> CollaboratorResult<Team>;
    async fn set_team_state(&self, id: &str, state: TeamState) -> CollaboratorResult<Team>;
    async fn add_members(
        &self,
        team_id: &str,
        user_ids: &[String],
        role: MemberRole,
    ) -> CollaboratorResult<()>;
    async fn remove_members(&self, team_id: &str, user_ids: &[String]) -> CollaboratorResult<()>;

    async fn get_school_year(&self, id: &str) -> CollaboratorResult<Option<SchoolYear>>;
    async fn create_school_year(&self, year: NewSchoolYear) -> CollaboratorResult<SchoolYear>;
    async fn set_school_year_active(&self, id: &str, active: bool)
        -> CollaboratorResult<SchoolYear>;
}

/// Delivers messages to users (mail, chat, in-app).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_user(
        &self,
        recipient: &str,
        message: &str,
        severity: NotificationSeverity,
    ) -> CollaboratorResult<()>;

    async fn notify_progress(
        &self,
        recipient: &str,
        process_id: Uuid,
        percent: u8,
        label: &str,
    ) -> CollaboratorResult<()>;
}

/// What changed, so the cache layer can drop the right keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityChangeKind {
    UserCreated,
    UserUpdated,
    UserDeactivated,
    TeamCreated,
    TeamUpdated,
    TeamArchived,
    TeamRestored,
    SchoolYearChanged,
}

#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate_for(&self, kind: EntityChangeKind, entity: &EntityRef);
}

/// Operation-history record written for every job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub process_id: Uuid,
    pub process_type: ProcessType,
    pub initiated_by: String,
    pub description: String,
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn create_entry(&self, entry: AuditEntry) -> CollaboratorResult<Uuid>;
    async fn update_status(
        &self,
        entry_id: Uuid,
        status: ProcessStatus,
        message: &str,
    ) -> CollaboratorResult<()>;
}

/// Raw answer of a component health check.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CheckReport {
    pub healthy: bool,
    pub warnings: Vec<String>,
    pub message: String,
}

#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn check(&self, component: SystemComponent) -> CollaboratorResult<CheckReport>;
    /// Attempt to bring the component back; returns a description of what was done.
    async fn repair(&self, component: SystemComponent) -> CollaboratorResult<String>;
}

/// Destination of rendered reports.
#[async_trait]
pub trait ExportStore: Send + Sync {
    /// Store `content` and return where it can be fetched from.
    async fn store(
        &self,
        name: &str,
        format: ExportFormat,
        content: Vec<u8>,
    ) -> CollaboratorResult<String>;
}

/// Bundle of every collaborator a job may call.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn DirectoryService>,
    pub notifications: Arc<dyn NotificationSink>,
    pub cache: Arc<dyn CacheInvalidator>,
    pub audit: Arc<dyn AuditLog>,
    pub health: Arc<dyn HealthChecker>,
    pub exports: Arc<dyn ExportStore>,
}
