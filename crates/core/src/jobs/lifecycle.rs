//! Team lifecycle: archive, restore, migrate and consolidate.

use crate::collaborators::{Collaborators, DirectoryService, EntityChangeKind};
use crate::engine::batch::ItemOutcome;
use crate::engine::gate::ConcurrencyGate;
use crate::engine::job::{ItemValidation, JobContext, JobKind};
use crate::engine::JobEngine;
use crate::jobs::{step_error, Orchestrator};
use crate::state::manager::ProcessManager;
use async_trait::async_trait;
use bk_protocol::entity_models::{MemberRole, Team, TeamState, UserRole};
use bk_protocol::ipc::NotificationSeverity;
use bk_protocol::job_models::{
    AuthContext, BulkOperationOptions, TeamConsolidation, TeamMigration, TeamRestoreRequest,
};
use bk_protocol::process_models::ProcessType;
use bk_protocol::result_models::{BulkOperationResult, EntityRef, OperationError, OperationSuccess};
use serde_json::json;
use tracing::debug;

pub struct TeamLifecycle {
    archive: JobEngine<ArchiveTeamsJob>,
    restore: JobEngine<RestoreTeamsJob>,
    migrate: JobEngine<MigrateTeamsJob>,
    consolidate: JobEngine<ConsolidateTeamsJob>,
    manager: ProcessManager,
}

impl TeamLifecycle {
    pub fn new(collaborators: Collaborators, manager: ProcessManager, gate_size: usize) -> Self {
        let gate = ConcurrencyGate::new(gate_size);
        Self {
            archive: JobEngine::new(
                ArchiveTeamsJob::new(ProcessType::TeamArchive),
                gate.clone(),
                manager.clone(),
                collaborators.clone(),
            ),
            restore: JobEngine::new(
                RestoreTeamsJob,
                gate.clone(),
                manager.clone(),
                collaborators.clone(),
            ),
            migrate: JobEngine::new(
                MigrateTeamsJob,
                gate.clone(),
                manager.clone(),
                collaborators.clone(),
            ),
            consolidate: JobEngine::new(ConsolidateTeamsJob, gate, manager.clone(), collaborators),
            manager,
        }
    }

    /// Archive teams by id.
    ///
    /// Honors `dry_run`, `notify_owners` and `cleanup_after_archive`. Teams
    /// that are already archived are reported as warnings, not errors.
    pub async fn run_archive(
        &self,
        team_ids: Vec<String>,
        options: BulkOperationOptions,
        auth: AuthContext,
    ) -> BulkOperationResult {
        self.archive.run(team_ids, options, auth).await
    }

    pub async fn run_restore(
        &self,
        requests: Vec<TeamRestoreRequest>,
        options: BulkOperationOptions,
        auth: AuthContext,
    ) -> BulkOperationResult {
        self.restore.run(requests, options, auth).await
    }

    pub async fn run_migrate(
        &self,
        migrations: Vec<TeamMigration>,
        options: BulkOperationOptions,
        auth: AuthContext,
    ) -> BulkOperationResult {
        self.migrate.run(migrations, options, auth).await
    }

    pub async fn run_consolidate(
        &self,
        consolidations: Vec<TeamConsolidation>,
        options: BulkOperationOptions,
        auth: AuthContext,
    ) -> BulkOperationResult {
        self.consolidate.run(consolidations, options, auth).await
    }
}

impl Orchestrator for TeamLifecycle {
    fn process_types(&self) -> &'static [ProcessType] {
        &[
            ProcessType::TeamArchive,
            ProcessType::TeamRestore,
            ProcessType::TeamMigration,
            ProcessType::TeamConsolidation,
        ]
    }

    fn manager(&self) -> &ProcessManager {
        &self.manager
    }
}

fn team_ref(team: &Team) -> EntityRef {
    EntityRef::new(team.id.clone(), team.name.clone())
}

/// Fetch a team or explain why it cannot be used.
async fn load_team(
    directory: &dyn DirectoryService,
    operation: &str,
    team_id: &str,
) -> Result<Team, OperationError> {
    let entity = EntityRef::new(team_id, team_id);
    match directory.get_team(team_id).await {
        Ok(Some(team)) => Ok(team),
        Ok(None) => Err(OperationError::new(
            operation,
            &entity,
            format!("Team {team_id} does not exist"),
        )),
        Err(e) => Err(step_error(operation, &entity, "Could not load team", e)),
    }
}

/// Archives teams. Also used by the school-year transition for its first phase.
pub struct ArchiveTeamsJob {
    process_type: ProcessType,
}

impl ArchiveTeamsJob {
    pub fn new(process_type: ProcessType) -> Self {
        Self { process_type }
    }

    /// Remove guest accounts from a freshly archived team.
    async fn remove_guests(&self, team: &Team, ctx: &JobContext, outcome: &mut ItemOutcome) {
        let directory = ctx.directory();
        let entity = team_ref(team);
        let mut guests = Vec::new();
        for member_id in team.all_member_ids() {
            match directory.get_user(&member_id).await {
                Ok(Some(user)) if user.role == UserRole::Guest => guests.push(user.id),
                Ok(_) => {}
                Err(e) => {
                    outcome.push_error(step_error(
                        "CleanupTeam",
                        &entity,
                        format!("Could not inspect member {member_id}"),
                        e,
                    ));
                    return;
                }
            }
        }
        if guests.is_empty() {
            return;
        }
        match directory.remove_members(&team.id, &guests).await {
            Ok(()) => outcome.push_success(
                OperationSuccess::new(
                    "CleanupTeam",
                    &entity,
                    format!("Removed {} guest member(s)", guests.len()),
                )
                .with_details(json!({ "removed": guests })),
            ),
            Err(e) => outcome.push_error(step_error(
                "CleanupTeam",
                &entity,
                "Failed to remove guest members",
                e,
            )),
        }
    }
}

#[async_trait]
impl JobKind for ArchiveTeamsJob {
    type Item = String;

    fn process_type(&self) -> ProcessType {
        self.process_type
    }

    fn operation_name(&self) -> &'static str {
        "ArchiveTeam"
    }

    fn validation_operation(&self) -> &'static str {
        "ValidateArchive"
    }

    fn item_ref(&self, team_id: &String) -> EntityRef {
        EntityRef::new(team_id.clone(), team_id.clone())
    }

    async fn validate_item(&self, team_id: &String, ctx: &JobContext) -> ItemValidation {
        match load_team(ctx.directory(), "ValidateArchive", team_id).await {
            Ok(team) if team.is_archived() => ItemValidation::Skip(OperationError::new(
                "ArchiveTeam",
                &team_ref(&team),
                "Team is already archived",
            )),
            Ok(_) => ItemValidation::Accept,
            Err(error) => ItemValidation::Reject(error),
        }
    }

    async fn process_item(&self, team_id: &String, ctx: &JobContext) -> ItemOutcome {
        let team = match load_team(ctx.directory(), "ArchiveTeam", team_id).await {
            Ok(team) => team,
            Err(error) => return ItemOutcome::failure(error),
        };
        let entity = team_ref(&team);

        if ctx.is_dry_run() {
            return ItemOutcome::success(
                OperationSuccess::new("ArchiveTeam", &entity, "Would archive team").with_details(
                    json!({ "owners": team.owner_ids.len(), "members": team.member_ids.len() }),
                ),
            );
        }

        if ctx.options.notify_owners {
            let message = format!("Team {} is being archived.", team.name);
            for owner in &team.owner_ids {
                ctx.notify(owner, &message, NotificationSeverity::Warning)
                    .await;
            }
        }

        if let Err(e) = ctx
            .directory()
            .set_team_state(&team.id, TeamState::Archived)
            .await
        {
            return ItemOutcome::failure(step_error(
                "ArchiveTeam",
                &entity,
                "Failed to archive team",
                e,
            ));
        }
        debug!(entity_id = %team.id, "team archived");
        let mut outcome =
            ItemOutcome::success(OperationSuccess::new("ArchiveTeam", &entity, "Team archived"));

        if ctx.options.cleanup_after_archive {
            self.remove_guests(&team, ctx, &mut outcome).await;
        }
        ctx.invalidate(EntityChangeKind::TeamArchived, &entity).await;
        outcome
    }
}

pub struct RestoreTeamsJob;

#[async_trait]
impl JobKind for RestoreTeamsJob {
    type Item = TeamRestoreRequest;

    fn process_type(&self) -> ProcessType {
        ProcessType::TeamRestore
    }

    fn operation_name(&self) -> &'static str {
        "RestoreTeam"
    }

    fn validation_operation(&self) -> &'static str {
        "ValidateRestore"
    }

    fn item_ref(&self, request: &TeamRestoreRequest) -> EntityRef {
        EntityRef::new(request.team_id.clone(), request.team_id.clone())
    }

    async fn validate_item(
        &self,
        request: &TeamRestoreRequest,
        ctx: &JobContext,
    ) -> ItemValidation {
        let directory = ctx.directory();
        let team = match load_team(directory, "ValidateRestore", &request.team_id).await {
            Ok(team) => team,
            Err(error) => return ItemValidation::Reject(error),
        };
        let entity = team_ref(&team);
        if !team.is_archived() {
            return ItemValidation::Skip(OperationError::new(
                "RestoreTeam",
                &entity,
                "Team is not archived",
            ));
        }
        match directory.get_user(&request.owner_id).await {
            Ok(Some(owner)) if owner.active => ItemValidation::Accept,
            Ok(Some(_)) => ItemValidation::Reject(OperationError::new(
                "ValidateRestore",
                &entity,
                format!("Owner {} is deactivated", request.owner_id),
            )),
            Ok(None) => ItemValidation::Reject(OperationError::new(
                "ValidateRestore",
                &entity,
                format!("Owner {} does not exist", request.owner_id),
            )),
            Err(e) => ItemValidation::Reject(step_error(
                "ValidateRestore",
                &entity,
                "Could not verify owner",
                e,
            )),
        }
    }

    async fn process_item(&self, request: &TeamRestoreRequest, ctx: &JobContext) -> ItemOutcome {
        let directory = ctx.directory();
        let team = match load_team(directory, "RestoreTeam", &request.team_id).await {
            Ok(team) => team,
            Err(error) => return ItemOutcome::failure(error),
        };
        let entity = team_ref(&team);
        if ctx.is_dry_run() {
            return ItemOutcome::success(OperationSuccess::new(
                "RestoreTeam",
                &entity,
                "Would restore team",
            ));
        }

        if let Err(e) = directory.set_team_state(&team.id, TeamState::Active).await {
            return ItemOutcome::failure(step_error(
                "RestoreTeam",
                &entity,
                "Failed to restore team",
                e,
            ));
        }
        let mut outcome =
            ItemOutcome::success(OperationSuccess::new("RestoreTeam", &entity, "Team restored"));

        if !team.owner_ids.contains(&request.owner_id) {
            match directory
                .add_members(&team.id, std::slice::from_ref(&request.owner_id), MemberRole::Owner)
                .await
            {
                Ok(()) => outcome.push_success(OperationSuccess::new(
                    "AssignOwner",
                    &entity,
                    format!("{} is now an owner", request.owner_id),
                )),
                Err(e) => outcome.push_error(step_error(
                    "AssignOwner",
                    &entity,
                    "Failed to assign owner",
                    e,
                )),
            }
        }
        ctx.invalidate(EntityChangeKind::TeamRestored, &entity).await;
        outcome
    }
}

pub struct MigrateTeamsJob;

#[async_trait]
impl JobKind for MigrateTeamsJob {
    type Item = TeamMigration;

    fn process_type(&self) -> ProcessType {
        ProcessType::TeamMigration
    }

    fn operation_name(&self) -> &'static str {
        "MigrateTeam"
    }

    fn validation_operation(&self) -> &'static str {
        "ValidateMigration"
    }

    fn item_ref(&self, migration: &TeamMigration) -> EntityRef {
        EntityRef::new(migration.team_id.clone(), migration.team_id.clone())
    }

    async fn validate_item(&self, migration: &TeamMigration, ctx: &JobContext) -> ItemValidation {
        let directory = ctx.directory();
        let team = match load_team(directory, "ValidateMigration", &migration.team_id).await {
            Ok(team) => team,
            Err(error) => return ItemValidation::Reject(error),
        };
        let entity = team_ref(&team);
        if team.is_archived() {
            return ItemValidation::Reject(OperationError::new(
                "ValidateMigration",
                &entity,
                "Archived teams cannot be migrated",
            ));
        }
        match directory
            .get_school_year(&migration.target_school_year_id)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => {
                return ItemValidation::Reject(OperationError::new(
                    "ValidateMigration",
                    &entity,
                    format!(
                        "School year {} does not exist",
                        migration.target_school_year_id
                    ),
                ))
            }
            Err(e) => {
                return ItemValidation::Reject(step_error(
                    "ValidateMigration",
                    &entity,
                    "Could not verify school year",
                    e,
                ))
            }
        }
        let same_year =
            team.school_year_id.as_deref() == Some(migration.target_school_year_id.as_str());
        let same_name = migration.new_name.as_ref().map_or(true, |name| *name == team.name);
        if same_year && same_name {
            return ItemValidation::Skip(OperationError::new(
                "MigrateTeam",
                &entity,
                "Team already belongs to the target school year",
            ));
        }
        ItemValidation::Accept
    }

    async fn process_item(&self, migration: &TeamMigration, ctx: &JobContext) -> ItemOutcome {
        let directory = ctx.directory();
        let mut team = match load_team(directory, "MigrateTeam", &migration.team_id).await {
            Ok(team) => team,
            Err(error) => return ItemOutcome::failure(error),
        };
        let previous = team_ref(&team);
        team.school_year_id = Some(migration.target_school_year_id.clone());
        if let Some(name) = &migration.new_name {
            team.name = name.clone();
        }
        let message = format!(
            "Moved to school year {} as {}",
            migration.target_school_year_id, team.name
        );

        if ctx.is_dry_run() {
            return ItemOutcome::success(OperationSuccess::new(
                "MigrateTeam",
                &previous,
                format!("Would be {}", message.to_lowercase()),
            ));
        }
        match directory.update_team(team).await {
            Ok(updated) => {
                let entity = team_ref(&updated);
                ctx.invalidate(EntityChangeKind::TeamUpdated, &entity).await;
                ItemOutcome::success(OperationSuccess::new("MigrateTeam", &entity, message))
            }
            Err(e) => ItemOutcome::failure(step_error(
                "MigrateTeam",
                &previous,
                "Failed to migrate team",
                e,
            )),
        }
    }
}

/// Merges the members of source teams into a target team and archives the sources.
pub struct ConsolidateTeamsJob;

#[async_trait]
impl JobKind for ConsolidateTeamsJob {
    type Item = TeamConsolidation;

    fn process_type(&self) -> ProcessType {
        ProcessType::TeamConsolidation
    }

    fn operation_name(&self) -> &'static str {
        "ConsolidateTeams"
    }

    fn validation_operation(&self) -> &'static str {
        "ValidateConsolidation"
    }

    fn item_ref(&self, consolidation: &TeamConsolidation) -> EntityRef {
        EntityRef::new(
            consolidation.target_team_id.clone(),
            consolidation.target_team_id.clone(),
        )
    }

    async fn validate_item(
        &self,
        consolidation: &TeamConsolidation,
        ctx: &JobContext,
    ) -> ItemValidation {
        let directory = ctx.directory();
        let target = match load_team(
            directory,
            "ValidateConsolidation",
            &consolidation.target_team_id,
        )
        .await
        {
            Ok(team) => team,
            Err(error) => return ItemValidation::Reject(error),
        };
        let entity = team_ref(&target);
        let reject = |message: String| {
            ItemValidation::Reject(OperationError::new("ValidateConsolidation", &entity, message))
        };

        if target.is_archived() {
            return reject("Target team is archived".to_string());
        }
        if consolidation.source_team_ids.is_empty() {
            return reject("No source teams given".to_string());
        }
        for source_id in &consolidation.source_team_ids {
            if *source_id == target.id {
                return reject("A team cannot be consolidated into itself".to_string());
            }
            if let Err(error) = load_team(directory, "ValidateConsolidation", source_id).await {
                return ItemValidation::Reject(error);
            }
        }
        ItemValidation::Accept
    }

    async fn process_item(
        &self,
        consolidation: &TeamConsolidation,
        ctx: &JobContext,
    ) -> ItemOutcome {
        let directory = ctx.directory();
        let target = match load_team(directory, "ConsolidateTeams", &consolidation.target_team_id)
            .await
        {
            Ok(team) => team,
            Err(error) => return ItemOutcome::failure(error),
        };
        let target_entity = team_ref(&target);
        let mut outcome = ItemOutcome::default();

        for source_id in &consolidation.source_team_ids {
            if ctx.is_cancelled() {
                break;
            }
            let source = match load_team(directory, "MergeTeam", source_id).await {
                Ok(team) => team,
                Err(error) => {
                    outcome.push_error(error);
                    continue;
                }
            };
            let source_entity = team_ref(&source);
            if ctx.is_dry_run() {
                outcome.push_success(OperationSuccess::new(
                    "MergeTeam",
                    &source_entity,
                    format!("Would merge into {}", target.name),
                ));
                continue;
            }

            let owners: Vec<String> = source
                .owner_ids
                .iter()
                .filter(|id| !target.owner_ids.contains(id))
                .cloned()
                .collect();
            let members: Vec<String> = source
                .member_ids
                .iter()
                .filter(|id| !target.all_member_ids().contains(id) && !owners.contains(id))
                .cloned()
                .collect();

            let copied = async {
                if !owners.is_empty() {
                    directory
                        .add_members(&target.id, &owners, MemberRole::Owner)
                        .await?;
                }
                if !members.is_empty() {
                    directory
                        .add_members(&target.id, &members, MemberRole::Member)
                        .await?;
                }
                directory
                    .set_team_state(&source.id, TeamState::Archived)
                    .await
            }
            .await;

            match copied {
                Ok(_) => {
                    outcome.push_success(
                        OperationSuccess::new(
                            "MergeTeam",
                            &source_entity,
                            format!("Merged into {} and archived", target.name),
                        )
                        .with_details(json!({ "owners": owners.len(), "members": members.len() })),
                    );
                    ctx.invalidate(EntityChangeKind::TeamArchived, &source_entity)
                        .await;
                }
                Err(e) => outcome.push_error(step_error(
                    "MergeTeam",
                    &source_entity,
                    format!("Failed to merge into {}", target.name),
                    e,
                )),
            }
        }

        if !ctx.is_dry_run() {
            ctx.invalidate(EntityChangeKind::TeamUpdated, &target_entity)
                .await;
        }
        outcome
    }
}
