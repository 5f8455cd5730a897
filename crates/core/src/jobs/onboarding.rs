//! User onboarding and offboarding.

use crate::collaborators::{Collaborators, EntityChangeKind};
use crate::engine::batch::ItemOutcome;
use crate::engine::gate::ConcurrencyGate;
use crate::engine::job::{ItemValidation, JobContext, JobKind};
use crate::engine::JobEngine;
use crate::jobs::{step_error, Orchestrator};
use crate::state::manager::ProcessManager;
use async_trait::async_trait;
use bk_protocol::entity_models::{MemberRole, Team, User};
use bk_protocol::ipc::NotificationSeverity;
use bk_protocol::job_models::{AuthContext, BulkOperationOptions, OffboardingPlan, OnboardingPlan};
use bk_protocol::process_models::ProcessType;
use bk_protocol::result_models::{BulkOperationResult, EntityRef, OperationError, OperationSuccess};
use serde_json::json;
use tracing::debug;

/// Creates new accounts and retires leaving ones.
pub struct UserProvisioning {
    onboarding: JobEngine<OnboardingJob>,
    offboarding: JobEngine<OffboardingJob>,
    manager: ProcessManager,
}

impl UserProvisioning {
    pub fn new(collaborators: Collaborators, manager: ProcessManager, gate_size: usize) -> Self {
        let gate = ConcurrencyGate::new(gate_size);
        Self {
            onboarding: JobEngine::new(
                OnboardingJob,
                gate.clone(),
                manager.clone(),
                collaborators.clone(),
            ),
            offboarding: JobEngine::new(OffboardingJob, gate, manager.clone(), collaborators),
            manager,
        }
    }

    pub async fn run_onboarding(
        &self,
        plans: Vec<OnboardingPlan>,
        options: BulkOperationOptions,
        auth: AuthContext,
    ) -> BulkOperationResult {
        self.onboarding.run(plans, options, auth).await
    }

    pub async fn run_offboarding(
        &self,
        plans: Vec<OffboardingPlan>,
        options: BulkOperationOptions,
        auth: AuthContext,
    ) -> BulkOperationResult {
        self.offboarding.run(plans, options, auth).await
    }
}

impl Orchestrator for UserProvisioning {
    fn process_types(&self) -> &'static [ProcessType] {
        &[ProcessType::Onboarding, ProcessType::Offboarding]
    }

    fn manager(&self) -> &ProcessManager {
        &self.manager
    }
}

pub struct OnboardingJob;

const VALIDATE_ONBOARDING: &str = "ValidateOnboardingPlan";

#[async_trait]
impl JobKind for OnboardingJob {
    type Item = OnboardingPlan;

    fn process_type(&self) -> ProcessType {
        ProcessType::Onboarding
    }

    fn operation_name(&self) -> &'static str {
        "OnboardUser"
    }

    fn validation_operation(&self) -> &'static str {
        VALIDATE_ONBOARDING
    }

    fn item_ref(&self, plan: &OnboardingPlan) -> EntityRef {
        EntityRef::new(
            plan.user.user_principal_name.to_lowercase(),
            plan.user.display_name.clone(),
        )
    }

    async fn validate_item(&self, plan: &OnboardingPlan, ctx: &JobContext) -> ItemValidation {
        let entity = self.item_ref(plan);
        let reject = |message: String| {
            ItemValidation::Reject(OperationError::new(VALIDATE_ONBOARDING, &entity, message))
        };

        if plan.user.display_name.trim().is_empty() {
            return reject("Display name is required".to_string());
        }
        if !plan.user.user_principal_name.contains('@') {
            return reject(format!(
                "'{}' is not a valid user principal name",
                plan.user.user_principal_name
            ));
        }

        let directory = ctx.directory();
        match directory.get_department(&plan.user.department_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return reject(format!(
                    "Department {} does not exist",
                    plan.user.department_id
                ))
            }
            Err(e) => {
                return ItemValidation::Reject(step_error(
                    VALIDATE_ONBOARDING,
                    &entity,
                    "Could not verify department",
                    e,
                ))
            }
        }

        for team_id in &plan.team_ids {
            match directory.get_team(team_id).await {
                Ok(Some(team)) if team.is_archived() => {
                    return reject(format!("Team {} is archived", team.name))
                }
                Ok(Some(_)) => {}
                Ok(None) => return reject(format!("Team {team_id} does not exist")),
                Err(e) => {
                    return ItemValidation::Reject(step_error(
                        VALIDATE_ONBOARDING,
                        &entity,
                        "Could not verify team",
                        e,
                    ))
                }
            }
        }

        match directory
            .find_user_by_upn(&plan.user.user_principal_name)
            .await
        {
            Ok(None) => ItemValidation::Accept,
            Ok(Some(existing)) => reject(format!(
                "User {} already exists ({})",
                plan.user.user_principal_name, existing.id
            )),
            Err(e) => ItemValidation::Reject(step_error(
                VALIDATE_ONBOARDING,
                &entity,
                "Could not check for an existing account",
                e,
            )),
        }
    }

    async fn process_item(&self, plan: &OnboardingPlan, ctx: &JobContext) -> ItemOutcome {
        let entity = self.item_ref(plan);
        if ctx.is_dry_run() {
            return ItemOutcome::success(
                OperationSuccess::new("OnboardUser", &entity, "Would create user").with_details(
                    json!({ "teams": plan.team_ids, "subjects": plan.subject_ids }),
                ),
            );
        }

        let directory = ctx.directory();
        let user = match directory.create_user(plan.user.clone()).await {
            Ok(user) => user,
            Err(e) => {
                return ItemOutcome::failure(step_error(
                    "CreateUser",
                    &entity,
                    "Failed to create user",
                    e,
                ))
            }
        };
        let entity = EntityRef::new(user.id.clone(), user.display_name.clone());
        debug!(entity_id = %user.id, "user created");

        let mut outcome = ItemOutcome::success(OperationSuccess::new(
            "CreateUser",
            &entity,
            format!("Created user {}", user.user_principal_name),
        ));

        for team_id in &plan.team_ids {
            match directory
                .add_members(team_id, std::slice::from_ref(&user.id), MemberRole::Member)
                .await
            {
                Ok(()) => outcome.push_success(OperationSuccess::new(
                    "AddToTeam",
                    &entity,
                    format!("Added to team {team_id}"),
                )),
                Err(e) => outcome.push_error(step_error(
                    "AddToTeam",
                    &entity,
                    format!("Failed to add user to team {team_id}"),
                    e,
                )),
            }
        }

        for subject_id in &plan.subject_ids {
            match directory.assign_subject(&user.id, subject_id).await {
                Ok(()) => outcome.push_success(OperationSuccess::new(
                    "AssignSubject",
                    &entity,
                    format!("Assigned subject {subject_id}"),
                )),
                Err(e) => outcome.push_error(step_error(
                    "AssignSubject",
                    &entity,
                    format!("Failed to assign subject {subject_id}"),
                    e,
                )),
            }
        }

        ctx.invalidate(EntityChangeKind::UserCreated, &entity).await;
        ctx.notify(
            &user.id,
            &format!("Welcome, {}! Your account is ready.", user.display_name),
            NotificationSeverity::Info,
        )
        .await;
        outcome
    }
}

pub struct OffboardingJob;

const VALIDATE_OFFBOARDING: &str = "ValidateOffboardingPlan";

#[async_trait]
impl JobKind for OffboardingJob {
    type Item = OffboardingPlan;

    fn process_type(&self) -> ProcessType {
        ProcessType::Offboarding
    }

    fn operation_name(&self) -> &'static str {
        "OffboardUser"
    }

    fn validation_operation(&self) -> &'static str {
        VALIDATE_OFFBOARDING
    }

    fn item_ref(&self, plan: &OffboardingPlan) -> EntityRef {
        EntityRef::new(plan.user_id.clone(), plan.user_id.clone())
    }

    async fn validate_item(&self, plan: &OffboardingPlan, ctx: &JobContext) -> ItemValidation {
        let entity = self.item_ref(plan);
        match ctx.directory().get_user(&plan.user_id).await {
            Ok(Some(user)) if !user.active => ItemValidation::Skip(OperationError::new(
                VALIDATE_OFFBOARDING,
                &user_ref(&user),
                "User is already deactivated",
            )),
            Ok(Some(_)) => ItemValidation::Accept,
            Ok(None) => ItemValidation::Reject(OperationError::new(
                VALIDATE_OFFBOARDING,
                &entity,
                format!("User {} does not exist", plan.user_id),
            )),
            Err(e) => ItemValidation::Reject(step_error(
                VALIDATE_OFFBOARDING,
                &entity,
                "Could not look up user",
                e,
            )),
        }
    }

    async fn process_item(&self, plan: &OffboardingPlan, ctx: &JobContext) -> ItemOutcome {
        let directory = ctx.directory();
        let user = match directory.get_user(&plan.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                return ItemOutcome::failure(OperationError::new(
                    "OffboardUser",
                    &self.item_ref(plan),
                    "User disappeared before offboarding",
                ))
            }
            Err(e) => {
                return ItemOutcome::failure(step_error(
                    "OffboardUser",
                    &self.item_ref(plan),
                    "Could not look up user",
                    e,
                ))
            }
        };
        let entity = user_ref(&user);

        let teams: Vec<Team> = match directory.list_teams().await {
            Ok(teams) => teams
                .into_iter()
                .filter(|t| t.all_member_ids().contains(&user.id))
                .collect(),
            Err(e) => {
                return ItemOutcome::failure(step_error(
                    "OffboardUser",
                    &entity,
                    "Could not list team memberships",
                    e,
                ))
            }
        };

        if ctx.is_dry_run() {
            let owned: Vec<&str> = teams
                .iter()
                .filter(|t| t.owner_ids.contains(&user.id))
                .map(|t| t.id.as_str())
                .collect();
            return ItemOutcome::success(
                OperationSuccess::new("OffboardUser", &entity, "Would offboard user")
                    .with_details(json!({ "teams": teams.len(), "owned_teams": owned })),
            );
        }

        let mut outcome = ItemOutcome::default();

        if plan.backup_data {
            match directory.backup_user_data(&user.id).await {
                Ok(location) => outcome.push_success(
                    OperationSuccess::new("BackupUserData", &entity, "User data backed up")
                        .with_details(json!({ "location": location })),
                ),
                Err(e) => {
                    // Never deactivate an account whose data could not be saved.
                    outcome.push_error(step_error(
                        "BackupUserData",
                        &entity,
                        "Backup failed; user was not deactivated",
                        e,
                    ));
                    return outcome;
                }
            }
        }

        let fallback = match &plan.fallback_owner_id {
            Some(id) => match directory.get_user(id).await {
                Ok(Some(owner)) if owner.active && owner.id != user.id => Some(owner),
                _ => None,
            },
            None => None,
        };

        let mut keep_membership = Vec::new();
        for team in teams.iter().filter(|t| t.owner_ids.contains(&user.id)) {
            let team_entity = EntityRef::new(team.id.clone(), team.name.clone());
            let Some(owner) = &fallback else {
                let message = match &plan.fallback_owner_id {
                    Some(id) => format!(
                        "Fallback owner {id} is unknown or inactive; \
                         ownership of {} was not transferred",
                        team.name
                    ),
                    None => format!(
                        "No fallback owner given; ownership of {} was not transferred",
                        team.name
                    ),
                };
                outcome.push_error(OperationError::new("TransferOwnership", &team_entity, message));
                keep_membership.push(team.id.clone());
                continue;
            };
            match directory
                .add_members(&team.id, std::slice::from_ref(&owner.id), MemberRole::Owner)
                .await
            {
                Ok(()) => outcome.push_success(OperationSuccess::new(
                    "TransferOwnership",
                    &team_entity,
                    format!("Ownership transferred to {}", owner.display_name),
                )),
                Err(e) => {
                    outcome.push_error(step_error(
                        "TransferOwnership",
                        &team_entity,
                        "Failed to transfer ownership",
                        e,
                    ));
                    keep_membership.push(team.id.clone());
                }
            }
        }

        // Teams without a new owner keep the leaving user so they are never left ownerless.
        for team in teams.iter().filter(|t| !keep_membership.contains(&t.id)) {
            let team_entity = EntityRef::new(team.id.clone(), team.name.clone());
            match directory
                .remove_members(&team.id, std::slice::from_ref(&user.id))
                .await
            {
                Ok(()) => outcome.push_success(OperationSuccess::new(
                    "RemoveMembership",
                    &team_entity,
                    format!("Removed {}", user.display_name),
                )),
                Err(e) => outcome.push_error(step_error(
                    "RemoveMembership",
                    &team_entity,
                    "Failed to remove membership",
                    e,
                )),
            }
        }

        match directory.set_user_active(&user.id, false).await {
            Ok(_) => outcome.push_success(OperationSuccess::new(
                "DeactivateUser",
                &entity,
                "User deactivated",
            )),
            Err(e) => outcome.push_error(step_error(
                "DeactivateUser",
                &entity,
                "Failed to deactivate user",
                e,
            )),
        }

        ctx.invalidate(EntityChangeKind::UserDeactivated, &entity)
            .await;
        outcome
    }
}

fn user_ref(user: &User) -> EntityRef {
    EntityRef::new(user.id.clone(), user.display_name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{DirectoryService, DirectorySnapshot, Sandbox};
    use bk_protocol::entity_models::{Department, NewUser, UserRole};
    use bk_protocol::process_models::ProcessStatus;

    fn sandbox() -> Sandbox {
        Sandbox::from_snapshot(DirectorySnapshot {
            departments: vec![Department {
                id: "dep-math".to_string(),
                name: "Mathematics".to_string(),
            }],
            users: vec![
                User {
                    id: "u-leaving".to_string(),
                    display_name: "Leaving Teacher".to_string(),
                    user_principal_name: "leaving@school.example".to_string(),
                    department_id: Some("dep-math".to_string()),
                    role: UserRole::Teacher,
                    active: true,
                    subject_ids: Vec::new(),
                },
                User {
                    id: "u-head".to_string(),
                    display_name: "Head of Department".to_string(),
                    user_principal_name: "head@school.example".to_string(),
                    department_id: Some("dep-math".to_string()),
                    role: UserRole::Teacher,
                    active: true,
                    subject_ids: Vec::new(),
                },
            ],
            teams: vec![Team {
                id: "t-algebra".to_string(),
                name: "Algebra 1".to_string(),
                state: Default::default(),
                school_year_id: None,
                department_id: Some("dep-math".to_string()),
                owner_ids: vec!["u-leaving".to_string()],
                member_ids: vec!["u-head".to_string()],
            }],
            ..Default::default()
        })
    }

    fn provisioning(sandbox: &Sandbox) -> UserProvisioning {
        UserProvisioning::new(sandbox.collaborators(), ProcessManager::default(), 2)
    }

    fn plan(upn: &str, department: &str) -> OnboardingPlan {
        OnboardingPlan {
            user: NewUser {
                display_name: upn.to_uppercase(),
                user_principal_name: format!("{upn}@school.example"),
                department_id: department.to_string(),
                role: UserRole::Student,
            },
            team_ids: vec!["t-algebra".to_string()],
            subject_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_onboarding_creates_user_and_membership() {
        let sandbox = sandbox();
        let result = provisioning(&sandbox)
            .run_onboarding(
                vec![plan("new", "dep-math")],
                BulkOperationOptions::default(),
                AuthContext::system(),
            )
            .await;

        assert_eq!(result.status, ProcessStatus::Completed);
        let operations: Vec<&str> = result
            .successful_operations
            .iter()
            .map(|s| s.operation.as_str())
            .collect();
        assert_eq!(operations, vec!["CreateUser", "AddToTeam"]);

        let snapshot = sandbox.directory.snapshot().await;
        let created = snapshot
            .users
            .iter()
            .find(|u| u.user_principal_name == "new@school.example")
            .unwrap();
        assert!(snapshot.teams[0].member_ids.contains(&created.id));
        assert_eq!(sandbox.cache.invalidations().await.len(), 1);
    }

    #[tokio::test]
    async fn test_onboarding_rejects_existing_upn() {
        let sandbox = sandbox();
        let result = provisioning(&sandbox)
            .run_onboarding(
                vec![plan("leaving", "dep-math")],
                BulkOperationOptions::default(),
                AuthContext::system(),
            )
            .await;

        assert_eq!(result.status, ProcessStatus::CompletedWithErrors);
        assert_eq!(result.errors[0].operation, "ValidateOnboardingPlan");
        assert!(result.errors[0].message.contains("already exists"));
    }

    #[tokio::test]
    async fn test_onboarding_dry_run_does_not_mutate() {
        let sandbox = sandbox();
        let options = BulkOperationOptions {
            dry_run: true,
            ..Default::default()
        };
        let result = provisioning(&sandbox)
            .run_onboarding(vec![plan("new", "dep-math")], options, AuthContext::system())
            .await;

        assert_eq!(result.status, ProcessStatus::Completed);
        assert_eq!(sandbox.directory.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_offboarding_transfers_ownership_and_deactivates() {
        let sandbox = sandbox();
        let plans = vec![OffboardingPlan {
            user_id: "u-leaving".to_string(),
            fallback_owner_id: Some("u-head".to_string()),
            backup_data: true,
        }];
        let result = provisioning(&sandbox)
            .run_offboarding(plans, BulkOperationOptions::default(), AuthContext::system())
            .await;

        assert_eq!(result.status, ProcessStatus::Completed, "{:?}", result.errors);
        let snapshot = sandbox.directory.snapshot().await;
        let team = &snapshot.teams[0];
        assert_eq!(team.owner_ids, vec!["u-head".to_string()]);
        assert!(!team.all_member_ids().contains(&"u-leaving".to_string()));
        assert!(!snapshot.users[0].active);
    }

    #[tokio::test]
    async fn test_offboarding_without_fallback_owner_still_deactivates() {
        let sandbox = sandbox();
        let plans = vec![OffboardingPlan {
            user_id: "u-leaving".to_string(),
            fallback_owner_id: None,
            backup_data: false,
        }];
        let result = provisioning(&sandbox)
            .run_offboarding(plans, BulkOperationOptions::default(), AuthContext::system())
            .await;

        assert_eq!(result.status, ProcessStatus::CompletedWithErrors);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].operation, "TransferOwnership");
        assert!(result
            .successful_operations
            .iter()
            .any(|s| s.operation == "DeactivateUser"));

        let snapshot = sandbox.directory.snapshot().await;
        assert_eq!(snapshot.teams[0].owner_ids, vec!["u-leaving".to_string()]);
        assert!(!snapshot.users[0].active);
    }

    #[tokio::test]
    async fn test_offboarding_backup_failure_keeps_account_active() {
        let sandbox = sandbox();
        sandbox.directory.fail_writes_for("u-leaving").await;
        let plans = vec![OffboardingPlan {
            user_id: "u-leaving".to_string(),
            fallback_owner_id: Some("u-head".to_string()),
            backup_data: true,
        }];
        let result = provisioning(&sandbox)
            .run_offboarding(plans, BulkOperationOptions::default(), AuthContext::system())
            .await;

        assert_eq!(result.errors[0].operation, "BackupUserData");
        assert!(sandbox.directory.snapshot().await.users[0].active);
    }

    #[tokio::test]
    async fn test_offboarding_inactive_user_is_skipped() {
        let sandbox = sandbox();
        sandbox
            .directory
            .set_user_active("u-leaving", false)
            .await
            .unwrap();
        let plans = vec![OffboardingPlan {
            user_id: "u-leaving".to_string(),
            fallback_owner_id: None,
            backup_data: true,
        }];
        let result = provisioning(&sandbox)
            .run_offboarding(plans, BulkOperationOptions::default(), AuthContext::system())
            .await;

        assert!(result.success);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.successful_operations.is_empty());
    }
}
