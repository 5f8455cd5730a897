//! In-memory collaborators.
//!
//! These back the test suites and the CLI sandbox runner. The directory
//! supports failure injection (unreachable service, per-entity write
//! failures, artificial latency) so partial-failure paths can be exercised
//! without a remote tenant.

use crate::collaborators::base::{
    AuditEntry, AuditLog, CacheInvalidator, CollaboratorError, CollaboratorResult, Collaborators,
    DirectoryService, EntityChangeKind, ExportStore, HealthChecker, NotificationSink, CheckReport,
};
use async_trait::async_trait;
use bk_protocol::entity_models::{
    Department, MemberRole, NewSchoolYear, NewTeam, NewUser, SchoolYear, Subject, Team,
    TeamState, User,
};
use bk_protocol::ipc::NotificationSeverity;
use bk_protocol::job_models::{ExportFormat, SystemComponent};
use bk_protocol::process_models::ProcessStatus;
use bk_protocol::result_models::EntityRef;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Serializable picture of the directory, used to seed the sandbox.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct DirectorySnapshot {
    pub users: Vec<User>,
    pub departments: Vec<Department>,
    pub teams: Vec<Team>,
    pub school_years: Vec<SchoolYear>,
    pub subjects: Vec<Subject>,
}

/// Directory held in memory.
#[derive(Default)]
pub struct InMemoryDirectory {
    state: Mutex<DirectorySnapshot>,
    failing_ids: Mutex<HashSet<String>>,
    unreachable: AtomicBool,
    latency_ms: AtomicU64,
    mutations: AtomicUsize,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
            ..Self::default()
        }
    }

    pub async fn snapshot(&self) -> DirectorySnapshot {
        self.state.lock().await.clone()
    }

    /// Make every call fail with `Unavailable`.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make writes touching `id` fail with `Unavailable`.
    pub async fn fail_writes_for(&self, id: impl Into<String>) {
        self.failing_ids.lock().await.insert(id.into());
    }

    /// Number of successful mutating calls.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.push(user);
    }

    pub async fn insert_team(&self, team: Team) {
        self.state.lock().await.teams.push(team);
    }

    pub async fn insert_department(&self, department: Department) {
        self.state.lock().await.departments.push(department);
    }

    async fn read_guard(&self) -> CollaboratorResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable(
                "directory endpoint unreachable".to_string(),
            ));
        }
        Ok(())
    }

    async fn write_guard(&self, ids: &[&str]) -> CollaboratorResult<()> {
        self.read_guard().await?;
        let failing = self.failing_ids.lock().await;
        if let Some(id) = ids.iter().find(|id| failing.contains(**id)) {
            return Err(CollaboratorError::Unavailable(format!(
                "write to {id} failed"
            )));
        }
        Ok(())
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

#[async_trait]
impl DirectoryService for InMemoryDirectory {
    async fn ping(&self) -> CollaboratorResult<()> {
        self.read_guard().await
    }

    async fn get_user(&self, id: &str) -> CollaboratorResult<Option<User>> {
        self.read_guard().await?;
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_upn(&self, upn: &str) -> CollaboratorResult<Option<User>> {
        self.read_guard().await?;
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .find(|u| u.user_principal_name.eq_ignore_ascii_case(upn))
            .cloned())
    }

    async fn list_users(&self) -> CollaboratorResult<Vec<User>> {
        self.read_guard().await?;
        Ok(self.state.lock().await.users.clone())
    }

    async fn create_user(&self, user: NewUser) -> CollaboratorResult<User> {
        self.write_guard(&[&user.user_principal_name]).await?;
        let mut state = self.state.lock().await;
        if state
            .users
            .iter()
            .any(|u| u.user_principal_name.eq_ignore_ascii_case(&user.user_principal_name))
        {
            return Err(CollaboratorError::Conflict(format!(
                "user {} already exists",
                user.user_principal_name
            )));
        }
        let created = User {
            id: new_id("user"),
            display_name: user.display_name,
            user_principal_name: user.user_principal_name,
            department_id: Some(user.department_id),
            role: user.role,
            active: true,
            subject_ids: Vec::new(),
        };
        state.users.push(created.clone());
        self.mutated();
        Ok(created)
    }

    async fn set_user_active(&self, id: &str, active: bool) -> CollaboratorResult<User> {
        self.write_guard(&[id]).await?;
        let mut state = self.state.lock().await;
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| CollaboratorError::not_found("user", id))?;
        user.active = active;
        let updated = user.clone();
        self.mutated();
        Ok(updated)
    }

    async fn assign_subject(&self, user_id: &str, subject_id: &str) -> CollaboratorResult<()> {
        self.write_guard(&[user_id, subject_id]).await?;
        let mut state = self.state.lock().await;
        if !state.subjects.iter().any(|s| s.id == subject_id) {
            return Err(CollaboratorError::not_found("subject", subject_id));
        }
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| CollaboratorError::not_found("user", user_id))?;
        if !user.subject_ids.iter().any(|s| s == subject_id) {
            user.subject_ids.push(subject_id.to_string());
        }
        self.mutated();
        Ok(())
    }

    async fn backup_user_data(&self, user_id: &str) -> CollaboratorResult<String> {
        self.write_guard(&[user_id]).await?;
        let state = self.state.lock().await;
        if !state.users.iter().any(|u| u.id == user_id) {
            return Err(CollaboratorError::not_found("user", user_id));
        }
        Ok(format!("memory://backups/{user_id}"))
    }

    async fn get_department(&self, id: &str) -> CollaboratorResult<Option<Department>> {
        self.read_guard().await?;
        let state = self.state.lock().await;
        Ok(state.departments.iter().find(|d| d.id == id).cloned())
    }

    async fn list_departments(&self) -> CollaboratorResult<Vec<Department>> {
        self.read_guard().await?;
        Ok(self.state.lock().await.departments.clone())
    }

    async fn get_subject(&self, id: &str) -> CollaboratorResult<Option<Subject>> {
        self.read_guard().await?;
        let state = self.state.lock().await;
        Ok(state.subjects.iter().find(|s| s.id == id).cloned())
    }

    async fn get_team(&self, id: &str) -> CollaboratorResult<Option<Team>> {
        self.read_guard().await?;
        let state = self.state.lock().await;
        Ok(state.teams.iter().find(|t| t.id == id).cloned())
    }

    async fn list_teams(&self) -> CollaboratorResult<Vec<Team>> {
        self.read_guard().await?;
        Ok(self.state.lock().await.teams.clone())
    }

    async fn create_team(&self, team: NewTeam) -> CollaboratorResult<Team> {
        self.write_guard(&[&team.name]).await?;
        let mut state = self.state.lock().await;
        let created = Team {
            id: new_id("team"),
            name: team.name,
            state: TeamState::Active,
            school_year_id: team.school_year_id,
            department_id: team.department_id,
            owner_ids: team.owner_ids,
            member_ids: team.member_ids,
        };
        state.teams.push(created.clone());
        self.mutated();
        Ok(created)
    }

    async fn update_team(&self, team: Team) -> CollaboratorResult<Team> {
        self.write_guard(&[&team.id]).await?;
        let mut state = self.state.lock().await;
        let existing = state
            .teams
            .iter_mut()
            .find(|t| t.id == team.id)
            .ok_or_else(|| CollaboratorError::not_found("team", team.id.clone()))?;
        *existing = team.clone();
        self.mutated();
        Ok(team)
    }

    async fn set_team_state(&self, id: &str, team_state: TeamState) -> CollaboratorResult<Team> {
        self.write_guard(&[id]).await?;
        let mut state = self.state.lock().await;
        let team = state
            .teams
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| CollaboratorError::not_found("team", id))?;
        team.state = team_state;
        let updated = team.clone();
        self.mutated();
        Ok(updated)
    }

    async fn add_members(
        &self,
        team_id: &str,
        user_ids: &[String],
        role: MemberRole,
    ) -> CollaboratorResult<()> {
        self.write_guard(&[team_id]).await?;
        let mut state = self.state.lock().await;
        if let Some(missing) = user_ids
            .iter()
            .find(|id| !state.users.iter().any(|u| &u.id == *id))
        {
            return Err(CollaboratorError::not_found("user", missing.clone()));
        }
        let team = state
            .teams
            .iter_mut()
            .find(|t| t.id == team_id)
            .ok_or_else(|| CollaboratorError::not_found("team", team_id))?;
        let target = match role {
            MemberRole::Owner => &mut team.owner_ids,
            MemberRole::Member => &mut team.member_ids,
        };
        for id in user_ids {
            if !target.contains(id) {
                target.push(id.clone());
            }
        }
        self.mutated();
        Ok(())
    }

    async fn remove_members(&self, team_id: &str, user_ids: &[String]) -> CollaboratorResult<()> {
        self.write_guard(&[team_id]).await?;
        let mut state = self.state.lock().await;
        let team = state
            .teams
            .iter_mut()
            .find(|t| t.id == team_id)
            .ok_or_else(|| CollaboratorError::not_found("team", team_id))?;
        team.owner_ids.retain(|id| !user_ids.contains(id));
        team.member_ids.retain(|id| !user_ids.contains(id));
        self.mutated();
        Ok(())
    }

    async fn get_school_year(&self, id: &str) -> CollaboratorResult<Option<SchoolYear>> {
        self.read_guard().await?;
        let state = self.state.lock().await;
        Ok(state.school_years.iter().find(|y| y.id == id).cloned())
    }

    async fn create_school_year(&self, year: NewSchoolYear) -> CollaboratorResult<SchoolYear> {
        self.write_guard(&[&year.name]).await?;
        let mut state = self.state.lock().await;
        if state.school_years.iter().any(|y| y.name == year.name) {
            return Err(CollaboratorError::Conflict(format!(
                "school year {} already exists",
                year.name
            )));
        }
        let created = SchoolYear {
            id: new_id("year"),
            name: year.name,
            starts_on: year.starts_on,
            ends_on: year.ends_on,
            active: false,
        };
        state.school_years.push(created.clone());
        self.mutated();
        Ok(created)
    }

    async fn set_school_year_active(
        &self,
        id: &str,
        active: bool,
    ) -> CollaboratorResult<SchoolYear> {
        self.write_guard(&[id]).await?;
        let mut state = self.state.lock().await;
        let year = state
            .school_years
            .iter_mut()
            .find(|y| y.id == id)
            .ok_or_else(|| CollaboratorError::not_found("school year", id))?;
        year.active = active;
        let updated = year.clone();
        self.mutated();
        Ok(updated)
    }
}

/// A notification captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedNotification {
    User {
        recipient: String,
        message: String,
        severity: NotificationSeverity,
    },
    Progress {
        recipient: String,
        process_id: Uuid,
        percent: u8,
        label: String,
    },
}

/// Keeps every notification in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<RecordedNotification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn all(&self) -> Vec<RecordedNotification> {
        self.sent.lock().await.clone()
    }

    /// `(recipient, message, severity)` of every user notification.
    pub async fn user_messages(&self) -> Vec<(String, String, NotificationSeverity)> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|n| match n {
                RecordedNotification::User {
                    recipient,
                    message,
                    severity,
                } => Some((recipient.clone(), message.clone(), *severity)),
                RecordedNotification::Progress { .. } => None,
            })
            .collect()
    }

    /// `(percent, label)` of every progress update for `process_id`.
    pub async fn progress_for(&self, process_id: Uuid) -> Vec<(u8, String)> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|n| match n {
                RecordedNotification::Progress {
                    process_id: id,
                    percent,
                    label,
                    ..
                } if *id == process_id => Some((*percent, label.clone())),
                _ => None,
            })
            .collect()
    }

    fn check(&self) -> CollaboratorResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable(
                "notification service down".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify_user(
        &self,
        recipient: &str,
        message: &str,
        severity: NotificationSeverity,
    ) -> CollaboratorResult<()> {
        self.check()?;
        self.sent.lock().await.push(RecordedNotification::User {
            recipient: recipient.to_string(),
            message: message.to_string(),
            severity,
        });
        Ok(())
    }

    async fn notify_progress(
        &self,
        recipient: &str,
        process_id: Uuid,
        percent: u8,
        label: &str,
    ) -> CollaboratorResult<()> {
        self.check()?;
        self.sent.lock().await.push(RecordedNotification::Progress {
            recipient: recipient.to_string(),
            process_id,
            percent,
            label: label.to_string(),
        });
        Ok(())
    }
}

/// Records every cache invalidation.
#[derive(Default)]
pub struct RecordingCache {
    invalidations: Mutex<Vec<(EntityChangeKind, EntityRef)>>,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn invalidations(&self) -> Vec<(EntityChangeKind, EntityRef)> {
        self.invalidations.lock().await.clone()
    }
}

#[async_trait]
impl CacheInvalidator for RecordingCache {
    async fn invalidate_for(&self, kind: EntityChangeKind, entity: &EntityRef) {
        self.invalidations.lock().await.push((kind, entity.clone()));
    }
}

/// An audit entry plus its latest status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub id: Uuid,
    pub entry: AuditEntry,
    pub status: ProcessStatus,
    pub message: String,
}

#[derive(Default)]
pub struct InMemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn create_entry(&self, entry: AuditEntry) -> CollaboratorResult<Uuid> {
        let id = Uuid::new_v4();
        self.records.lock().await.push(AuditRecord {
            id,
            entry,
            status: ProcessStatus::Running,
            message: String::new(),
        });
        Ok(id)
    }

    async fn update_status(
        &self,
        entry_id: Uuid,
        status: ProcessStatus,
        message: &str,
    ) -> CollaboratorResult<()> {
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == entry_id)
            .ok_or_else(|| CollaboratorError::not_found("audit entry", entry_id.to_string()))?;
        record.status = status;
        record.message = message.to_string();
        Ok(())
    }
}

/// Scripted answer of [`StaticHealthChecker`] for one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckBehavior {
    Healthy,
    Warning(String),
    Unhealthy(String),
    /// The check itself fails (component unreachable).
    Failing(String),
    /// Healthy, but only after the given delay.
    Slow(Duration),
}

/// Health checker answering from a script. Components not in the script are healthy.
#[derive(Default)]
pub struct StaticHealthChecker {
    behaviors: Mutex<HashMap<SystemComponent, CheckBehavior>>,
    unrepairable: Mutex<HashSet<SystemComponent>>,
}

impl StaticHealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, component: SystemComponent, behavior: CheckBehavior) {
        self.behaviors.lock().await.insert(component, behavior);
    }

    pub async fn set_unrepairable(&self, component: SystemComponent) {
        self.unrepairable.lock().await.insert(component);
    }

    async fn behavior(&self, component: SystemComponent) -> CheckBehavior {
        self.behaviors
            .lock()
            .await
            .get(&component)
            .cloned()
            .unwrap_or(CheckBehavior::Healthy)
    }
}

#[async_trait]
impl HealthChecker for StaticHealthChecker {
    async fn check(&self, component: SystemComponent) -> CollaboratorResult<CheckReport> {
        match self.behavior(component).await {
            CheckBehavior::Healthy => Ok(CheckReport {
                healthy: true,
                warnings: Vec::new(),
                message: format!("{} responding", component.label()),
            }),
            CheckBehavior::Warning(warning) => Ok(CheckReport {
                healthy: true,
                warnings: vec![warning],
                message: format!("{} responding with warnings", component.label()),
            }),
            CheckBehavior::Unhealthy(message) => Ok(CheckReport {
                healthy: false,
                warnings: Vec::new(),
                message,
            }),
            CheckBehavior::Failing(message) => Err(CollaboratorError::Unavailable(message)),
            CheckBehavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(CheckReport {
                    healthy: true,
                    warnings: Vec::new(),
                    message: format!("{} responding", component.label()),
                })
            }
        }
    }

    async fn repair(&self, component: SystemComponent) -> CollaboratorResult<String> {
        if self.unrepairable.lock().await.contains(&component) {
            return Err(CollaboratorError::Rejected(format!(
                "{} cannot be repaired automatically",
                component.label()
            )));
        }
        self.behaviors
            .lock()
            .await
            .insert(component, CheckBehavior::Healthy);
        Ok(format!("{} restarted", component.label()))
    }
}

/// Keeps exported reports in memory, addressed by `memory://exports/<name>.<ext>`.
#[derive(Default)]
pub struct InMemoryExportStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryExportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, location: &str) -> Option<Vec<u8>> {
        self.files.lock().await.get(location).cloned()
    }

    pub async fn locations(&self) -> Vec<String> {
        let mut locations: Vec<String> = self.files.lock().await.keys().cloned().collect();
        locations.sort();
        locations
    }
}

#[async_trait]
impl ExportStore for InMemoryExportStore {
    async fn store(
        &self,
        name: &str,
        format: ExportFormat,
        content: Vec<u8>,
    ) -> CollaboratorResult<String> {
        let location = format!("memory://exports/{name}.{}", format.extension());
        self.files.lock().await.insert(location.clone(), content);
        Ok(location)
    }
}

/// Every in-memory collaborator, with typed handles for inspection.
#[derive(Clone)]
pub struct Sandbox {
    pub directory: Arc<InMemoryDirectory>,
    pub notifier: Arc<RecordingNotifier>,
    pub cache: Arc<RecordingCache>,
    pub audit: Arc<InMemoryAuditLog>,
    pub checker: Arc<StaticHealthChecker>,
    pub exports: Arc<InMemoryExportStore>,
}

impl Sandbox {
    pub fn new(directory: InMemoryDirectory) -> Self {
        Self {
            directory: Arc::new(directory),
            notifier: Arc::new(RecordingNotifier::new()),
            cache: Arc::new(RecordingCache::new()),
            audit: Arc::new(InMemoryAuditLog::new()),
            checker: Arc::new(StaticHealthChecker::new()),
            exports: Arc::new(InMemoryExportStore::new()),
        }
    }

    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Self {
        Self::new(InMemoryDirectory::from_snapshot(snapshot))
    }

    /// The trait-object bundle handed to orchestrators.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            directory: self.directory.clone(),
            notifications: self.notifier.clone(),
            cache: self.cache.clone(),
            audit: self.audit.clone(),
            health: self.checker.clone(),
            exports: self.exports.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            display_name: id.to_uppercase(),
            user_principal_name: format!("{id}@school.example"),
            department_id: None,
            role: Default::default(),
            active: true,
            subject_ids: Vec::new(),
        }
    }

    fn team(id: &str) -> Team {
        Team {
            id: id.to_string(),
            name: id.to_uppercase(),
            state: TeamState::Active,
            school_year_id: None,
            department_id: None,
            owner_ids: Vec::new(),
            member_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicate_upn() {
        let directory = InMemoryDirectory::new();
        directory.insert_user(user("ada")).await;

        let result = directory
            .create_user(NewUser {
                display_name: "Ada".to_string(),
                user_principal_name: "ADA@school.example".to_string(),
                department_id: "dep".to_string(),
                role: Default::default(),
            })
            .await;

        assert!(matches!(result, Err(CollaboratorError::Conflict(_))));
        assert_eq!(directory.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_directory_fails_every_call() {
        let directory = InMemoryDirectory::new();
        directory.set_unreachable(true);

        assert!(directory.ping().await.is_err());
        assert!(matches!(
            directory.get_team("t").await,
            Err(CollaboratorError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_failing_writes_only_affect_listed_ids() {
        let directory = InMemoryDirectory::new();
        directory.insert_team(team("t-1")).await;
        directory.insert_team(team("t-2")).await;
        directory.fail_writes_for("t-1").await;

        assert!(directory.set_team_state("t-1", TeamState::Archived).await.is_err());
        assert!(directory.set_team_state("t-2", TeamState::Archived).await.is_ok());
        assert!(directory.get_team("t-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_add_members_requires_existing_users() {
        let directory = InMemoryDirectory::new();
        directory.insert_team(team("t-1")).await;
        directory.insert_user(user("ada")).await;

        let ok = directory
            .add_members("t-1", &["ada".to_string()], MemberRole::Owner)
            .await;
        assert!(ok.is_ok());

        let missing = directory
            .add_members("t-1", &["ghost".to_string()], MemberRole::Member)
            .await;
        assert!(matches!(missing, Err(CollaboratorError::NotFound { .. })));

        let team = directory.get_team("t-1").await.unwrap().unwrap();
        assert_eq!(team.owner_ids, vec!["ada".to_string()]);
        assert!(team.member_ids.is_empty());
    }

    #[tokio::test]
    async fn test_audit_log_tracks_status() {
        let audit = InMemoryAuditLog::new();
        let id = audit
            .create_entry(AuditEntry {
                process_id: Uuid::new_v4(),
                process_type: bk_protocol::process_models::ProcessType::Report,
                initiated_by: "admin".to_string(),
                description: "export".to_string(),
            })
            .await
            .unwrap();

        audit
            .update_status(id, ProcessStatus::Completed, "1 succeeded")
            .await
            .unwrap();

        let records = audit.records().await;
        assert_eq!(records[0].status, ProcessStatus::Completed);
        assert!(audit
            .update_status(Uuid::new_v4(), ProcessStatus::Failed, "")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_checker_repair_restores_health() {
        let checker = StaticHealthChecker::new();
        checker
            .set(SystemComponent::Cache, CheckBehavior::Failing("down".to_string()))
            .await;
        assert!(checker.check(SystemComponent::Cache).await.is_err());

        checker.repair(SystemComponent::Cache).await.unwrap();
        assert!(checker.check(SystemComponent::Cache).await.unwrap().healthy);
    }
}
