//! School-year transition.
//!
//! A transition is one registered process holding a slot of the transition
//! gate from start to end. While it holds the slot it creates the new school
//! year, archives the teams of the old one, creates the new year's teams from
//! templates and finally switches the active year. The archive and create
//! phases run as child processes whose tokens derive from the transition's
//! token, so cancelling the transition also stops the running phase.

use crate::collaborators::{AuditEntry, Collaborators, EntityChangeKind};
use crate::engine::aggregator::{resolve_status, summary, ResultAggregator};
use crate::engine::batch::ItemOutcome;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::gate::ConcurrencyGate;
use crate::engine::job::{ItemValidation, JobContext, JobKind};
use crate::engine::{panic_message, severity_for, JobEngine};
use crate::jobs::lifecycle::ArchiveTeamsJob;
use crate::jobs::{step_error, Orchestrator};
use crate::state::manager::ProcessManager;
use crate::state::process::{
    cancel_process, complete_process, create_process, fail_process, record_items,
};
use async_trait::async_trait;
use bk_protocol::entity_models::{NewTeam, SchoolYear};
use bk_protocol::job_models::{AuthContext, BulkOperationOptions, SchoolYearTransitionRequest};
use bk_protocol::process_models::{ProcessStatus, ProcessType};
use bk_protocol::result_models::{
    BulkOperationResult, EntityRef, OperationError, OperationSuccess,
};
use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

const PROCESS_TYPE: ProcessType = ProcessType::SchoolYearTransition;

pub struct SchoolYearTransition {
    archive: JobEngine<ArchiveTeamsJob>,
    create: JobEngine<CreateTeamsJob>,
    gate: ConcurrencyGate,
    collaborators: Collaborators,
    manager: ProcessManager,
}

/// A transition that passed validation and owns a process.
struct TransitionRun {
    process_id: Uuid,
    token: CancellationToken,
    from_year: SchoolYear,
    request: SchoolYearTransitionRequest,
    options: BulkOperationOptions,
    auth: AuthContext,
}

impl SchoolYearTransition {
    pub fn new(collaborators: Collaborators, manager: ProcessManager, gate_size: usize) -> Self {
        // Phases only run while their transition holds a slot of `gate`.
        let phase_gate = ConcurrencyGate::new(gate_size);
        Self {
            archive: JobEngine::new(
                ArchiveTeamsJob::new(PROCESS_TYPE),
                phase_gate.clone(),
                manager.clone(),
                collaborators.clone(),
            ),
            create: JobEngine::new(
                CreateTeamsJob,
                phase_gate,
                manager.clone(),
                collaborators.clone(),
            ),
            gate: ConcurrencyGate::new(gate_size),
            collaborators,
            manager,
        }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Move the organization from one school year to the next.
    ///
    /// # Arguments
    ///
    /// * `request` - The year being closed, the new year and its team templates
    /// * `options` - Applied to both phases
    /// * `auth` - Initiator of the transition and both phases
    ///
    /// # Returns
    ///
    /// One result carrying the transition's process id and the entries of
    /// every step. The create phase is skipped when the archive phase ends
    /// `Cancelled` or `Failed`, and the new year is only activated when both
    /// phases ran to completion. Only a rejected request has no process id.
    pub async fn run_transition(
        &self,
        request: SchoolYearTransitionRequest,
        options: BulkOperationOptions,
        auth: AuthContext,
    ) -> BulkOperationResult {
        let request_ref = EntityRef::new(
            request.from_school_year_id.clone(),
            request.new_school_year.name.clone(),
        );
        if request.new_school_year.ends_on <= request.new_school_year.starts_on {
            return ResultAggregator::rejected(
                PROCESS_TYPE,
                OperationError::new(
                    "ValidateTransition",
                    &request_ref,
                    "The new school year must end after it starts",
                ),
            );
        }

        let directory = self.collaborators.directory.as_ref();
        let from_year = match directory.get_school_year(&request.from_school_year_id).await {
            Ok(Some(year)) => year,
            Ok(None) => {
                return ResultAggregator::rejected(
                    PROCESS_TYPE,
                    OperationError::new(
                        "ValidateTransition",
                        &request_ref,
                        format!("School year {} does not exist", request.from_school_year_id),
                    ),
                )
            }
            Err(e) => {
                return ResultAggregator::rejected(
                    PROCESS_TYPE,
                    step_error("ValidateTransition", &request_ref, "Could not load school year", e),
                )
            }
        };

        let process = create_process(
            PROCESS_TYPE,
            vec![from_year.id.clone(), request.new_school_year.name.clone()],
            auth.user_id.clone(),
        );
        let process_id = process.id;
        let token = self.manager.begin(process);
        let span = info_span!("school_year_transition", %process_id, from = %from_year.id);
        let run = TransitionRun {
            process_id,
            token,
            from_year,
            request,
            options,
            auth,
        };
        self.execute(run).instrument(span).await
    }

    async fn execute(&self, run: TransitionRun) -> BulkOperationResult {
        let process_id = run.process_id;
        let audit_id = self.open_audit(&run).await;

        self.manager
            .report_progress(process_id, "Waiting for execution slot", None);
        let mut parts = Vec::new();
        let outcome = match self.gate.acquire(&run.token).await {
            Ok(permit) => {
                let steps = AssertUnwindSafe(self.run_steps(&run, &mut parts))
                    .catch_unwind()
                    .await;
                drop(permit);
                steps.unwrap_or_else(|panic| Err(EngineError::Aborted(panic_message(panic))))
            }
            Err(e) => Err(e),
        };

        let mut aggregator = ResultAggregator::new(PROCESS_TYPE, Some(process_id));
        for part in parts {
            aggregator.add_result(part);
        }
        let status = match outcome {
            Ok(()) => {
                let has_errors = aggregator.has_errors();
                self.manager
                    .update(process_id, |p| complete_process(p, has_errors));
                resolve_status(run.token.is_cancelled(), has_errors)
            }
            Err(EngineError::Cancelled) => {
                self.manager.update(process_id, cancel_process);
                ProcessStatus::Cancelled
            }
            Err(e) => {
                error!(error = %e, "school-year transition failed");
                if !aggregator.has_errors() {
                    let entity = EntityRef::new(process_id.to_string(), PROCESS_TYPE.label());
                    aggregator.add_error(OperationError::new(
                        "SchoolYearTransition",
                        &entity,
                        e.to_string(),
                    ));
                }
                let message = e.to_string();
                self.manager.update(process_id, |p| fail_process(p, message));
                ProcessStatus::Failed
            }
        };
        // A cancellation that raced with completion has already settled the registry.
        let status = self
            .manager
            .get_process(process_id)
            .map(|p| p.status)
            .filter(|s| s.is_terminal())
            .unwrap_or(status);

        let result = aggregator.build(status);
        let text = summary(&result);
        info!(
            status = ?status,
            succeeded = result.success_count(),
            failed = result.error_count(),
            "transition finished"
        );

        if let Some(audit_id) = audit_id {
            if let Err(e) = self
                .collaborators
                .audit
                .update_status(audit_id, status, &text)
                .await
            {
                warn!(error = %e, "failed to update audit entry");
            }
        }
        if let Err(e) = self
            .collaborators
            .notifications
            .notify_user(&run.auth.user_id, &text, severity_for(status))
            .await
        {
            warn!(error = %e, "notification failed");
        }
        self.manager.finish(process_id);
        result
    }

    /// Every step of the transition, run while holding a gate slot.
    ///
    /// Each step's entries are pushed to `parts` before the next step starts,
    /// so an early return still reports what already happened.
    async fn run_steps(
        &self,
        run: &TransitionRun,
        parts: &mut Vec<BulkOperationResult>,
    ) -> EngineResult<()> {
        let TransitionRun {
            process_id,
            token,
            from_year,
            request,
            options,
            auth,
        } = run;
        let process_id = *process_id;

        self.manager
            .report_progress(process_id, "Creating school year", Some(5));
        let (new_year, setup) = self.create_year(request, options.dry_run).await;
        parts.push(setup);
        let new_year = match new_year {
            Ok(year) => year,
            Err(e) => {
                self.manager.update(process_id, |p| record_items(p, 0, 1));
                return Err(e);
            }
        };

        ensure_running(token)?;
        let old_team_ids: Vec<String> = match self.collaborators.directory.list_teams().await {
            Ok(teams) => teams
                .into_iter()
                .filter(|t| {
                    t.school_year_id.as_deref() == Some(from_year.id.as_str()) && !t.is_archived()
                })
                .map(|t| t.id)
                .collect(),
            Err(e) => {
                let mut failed = ResultAggregator::new(PROCESS_TYPE, None);
                failed.add_error(step_error(
                    "ArchiveTeam",
                    &year_ref(from_year),
                    "Could not list the teams of the old school year",
                    e.clone(),
                ));
                parts.push(failed.build(ProcessStatus::Failed));
                return Err(e.into());
            }
        };

        if !old_team_ids.is_empty() {
            info!(teams = old_team_ids.len(), from = %from_year.id, "archiving old school year");
            self.manager
                .report_progress(process_id, "Archiving teams of the old school year", Some(10));
            let archived = self
                .archive
                .run_child(old_team_ids, options.clone(), auth.clone(), token)
                .await;
            let status = archived.status;
            parts.push(archived);
            phase_finished("archive", status)?;
        }

        ensure_running(token)?;
        if !request.team_templates.is_empty() {
            let templates: Vec<NewTeam> = request
                .team_templates
                .iter()
                .cloned()
                .map(|mut template| {
                    template.school_year_id = Some(new_year.id.clone());
                    template
                })
                .collect();
            info!(teams = templates.len(), to = %new_year.id, "creating teams for new school year");
            self.manager
                .report_progress(process_id, "Creating teams of the new school year", Some(50));
            let created = self
                .create
                .run_child(templates, options.clone(), auth.clone(), token)
                .await;
            let status = created.status;
            parts.push(created);
            phase_finished("create", status)?;
        }

        ensure_running(token)?;
        if options.dry_run {
            self.manager.update(process_id, |p| record_items(p, 2, 0));
            return Ok(());
        }
        self.manager
            .report_progress(process_id, "Switching the active school year", Some(90));
        let switch = self.switch_active_year(from_year, &new_year).await;
        let switched = switch.success_count();
        let failed = switch.error_count();
        self.manager
            .update(process_id, |p| record_items(p, switched, failed));
        parts.push(switch);
        Ok(())
    }

    /// Create the new (inactive) school year.
    async fn create_year(
        &self,
        request: &SchoolYearTransitionRequest,
        dry_run: bool,
    ) -> (EngineResult<SchoolYear>, BulkOperationResult) {
        let mut setup = ResultAggregator::new(PROCESS_TYPE, None);
        let entity = EntityRef::new(
            request.new_school_year.name.clone(),
            request.new_school_year.name.clone(),
        );

        if dry_run {
            setup.add_success(OperationSuccess::new(
                "CreateSchoolYear",
                &entity,
                "Would create school year",
            ));
            let placeholder = SchoolYear {
                id: format!("pending:{}", request.new_school_year.name),
                name: request.new_school_year.name.clone(),
                starts_on: request.new_school_year.starts_on,
                ends_on: request.new_school_year.ends_on,
                active: false,
            };
            return (Ok(placeholder), setup.build(ProcessStatus::Completed));
        }

        match self
            .collaborators
            .directory
            .create_school_year(request.new_school_year.clone())
            .await
        {
            Ok(year) => {
                setup.add_success(
                    OperationSuccess::new(
                        "CreateSchoolYear",
                        &year_ref(&year),
                        "School year created",
                    )
                    .with_details(json!({ "school_year_id": year.id })),
                );
                (Ok(year), setup.build(ProcessStatus::Completed))
            }
            Err(e) => {
                setup.add_error(step_error(
                    "CreateSchoolYear",
                    &entity,
                    "Failed to create school year",
                    e.clone(),
                ));
                (Err(e.into()), setup.build(ProcessStatus::Failed))
            }
        }
    }

    /// Activate `to`, then deactivate `from`; one entry per year.
    async fn switch_active_year(&self, from: &SchoolYear, to: &SchoolYear) -> BulkOperationResult {
        let directory = self.collaborators.directory.as_ref();
        let mut switch = ResultAggregator::new(PROCESS_TYPE, None);
        for (year, active) in [(to, true), (from, false)] {
            let entity = year_ref(year);
            let operation = if active {
                "ActivateSchoolYear"
            } else {
                "DeactivateSchoolYear"
            };
            match directory.set_school_year_active(&year.id, active).await {
                Ok(_) => {
                    self.collaborators
                        .cache
                        .invalidate_for(EntityChangeKind::SchoolYearChanged, &entity)
                        .await;
                    switch.add_success(OperationSuccess::new(operation, &entity, "Done"));
                }
                Err(e) => switch.add_error(step_error(
                    operation,
                    &entity,
                    "Failed to switch the active school year",
                    e,
                )),
            }
        }
        let status = if switch.has_errors() {
            ProcessStatus::CompletedWithErrors
        } else {
            ProcessStatus::Completed
        };
        switch.build(status)
    }

    async fn open_audit(&self, run: &TransitionRun) -> Option<Uuid> {
        let entry = AuditEntry {
            process_id: run.process_id,
            process_type: PROCESS_TYPE,
            initiated_by: run.auth.user_id.clone(),
            description: format!(
                "School-year transition from {} to {}",
                run.from_year.name, run.request.new_school_year.name
            ),
        };
        match self.collaborators.audit.create_entry(entry).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "failed to create audit entry");
                None
            }
        }
    }
}

impl Orchestrator for SchoolYearTransition {
    fn process_types(&self) -> &'static [ProcessType] {
        &[ProcessType::SchoolYearTransition]
    }

    fn manager(&self) -> &ProcessManager {
        &self.manager
    }
}

fn year_ref(year: &SchoolYear) -> EntityRef {
    EntityRef::new(year.id.clone(), year.name.clone())
}

fn ensure_running(token: &CancellationToken) -> EngineResult<()> {
    if token.is_cancelled() {
        Err(EngineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Stop the transition when a phase did not run to completion.
fn phase_finished(phase: &str, status: ProcessStatus) -> EngineResult<()> {
    match status {
        ProcessStatus::Cancelled => {
            warn!(phase, "phase cancelled; stopping transition");
            Err(EngineError::Cancelled)
        }
        ProcessStatus::Failed => {
            warn!(phase, "phase failed; stopping transition");
            Err(EngineError::Aborted(format!("{phase} phase failed")))
        }
        _ => Ok(()),
    }
}

/// Creates teams from templates.
pub struct CreateTeamsJob;

#[async_trait]
impl JobKind for CreateTeamsJob {
    type Item = NewTeam;

    fn process_type(&self) -> ProcessType {
        ProcessType::SchoolYearTransition
    }

    fn operation_name(&self) -> &'static str {
        "CreateTeam"
    }

    fn validation_operation(&self) -> &'static str {
        "ValidateTeamTemplate"
    }

    fn item_ref(&self, template: &NewTeam) -> EntityRef {
        EntityRef::new(template.name.clone(), template.name.clone())
    }

    async fn validate_item(&self, template: &NewTeam, ctx: &JobContext) -> ItemValidation {
        let entity = self.item_ref(template);
        if template.name.trim().is_empty() {
            return ItemValidation::Reject(OperationError::new(
                "ValidateTeamTemplate",
                &entity,
                "Team name is required",
            ));
        }
        for owner_id in &template.owner_ids {
            match ctx.directory().get_user(owner_id).await {
                Ok(Some(owner)) if owner.active => {}
                Ok(_) => {
                    return ItemValidation::Reject(OperationError::new(
                        "ValidateTeamTemplate",
                        &entity,
                        format!("Owner {owner_id} does not exist or is deactivated"),
                    ))
                }
                Err(e) => {
                    return ItemValidation::Reject(step_error(
                        "ValidateTeamTemplate",
                        &entity,
                        "Could not verify owner",
                        e,
                    ))
                }
            }
        }
        ItemValidation::Accept
    }

    async fn process_item(&self, template: &NewTeam, ctx: &JobContext) -> ItemOutcome {
        let entity = self.item_ref(template);
        if ctx.is_dry_run() {
            return ItemOutcome::success(OperationSuccess::new(
                "CreateTeam",
                &entity,
                "Would create team",
            ));
        }
        match ctx.directory().create_team(template.clone()).await {
            Ok(team) => {
                let created = EntityRef::new(team.id.clone(), team.name.clone());
                ctx.invalidate(EntityChangeKind::TeamCreated, &created).await;
                ItemOutcome::success(OperationSuccess::new("CreateTeam", &created, "Team created"))
            }
            Err(e) => ItemOutcome::failure(step_error(
                "CreateTeam",
                &entity,
                "Failed to create team",
                e,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{DirectorySnapshot, Sandbox};
    use bk_protocol::entity_models::{NewSchoolYear, Team, TeamState};
    use chrono::NaiveDate;
    use std::time::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn old_team(id: &str) -> Team {
        Team {
            id: id.to_string(),
            name: format!("{id} 2024"),
            state: TeamState::Active,
            school_year_id: Some("y-2024".to_string()),
            department_id: None,
            owner_ids: Vec::new(),
            member_ids: Vec::new(),
        }
    }

    fn sandbox() -> Sandbox {
        Sandbox::from_snapshot(DirectorySnapshot {
            school_years: vec![SchoolYear {
                id: "y-2024".to_string(),
                name: "2024/25".to_string(),
                starts_on: date(2024, 9, 1),
                ends_on: date(2025, 7, 31),
                active: true,
            }],
            teams: vec![old_team("t-a"), old_team("t-b")],
            ..Default::default()
        })
    }

    fn request(templates: &[&str]) -> SchoolYearTransitionRequest {
        SchoolYearTransitionRequest {
            from_school_year_id: "y-2024".to_string(),
            new_school_year: NewSchoolYear {
                name: "2025/26".to_string(),
                starts_on: date(2025, 9, 1),
                ends_on: date(2026, 7, 31),
            },
            team_templates: templates
                .iter()
                .map(|name| NewTeam {
                    name: name.to_string(),
                    school_year_id: None,
                    department_id: None,
                    owner_ids: Vec::new(),
                    member_ids: Vec::new(),
                })
                .collect(),
        }
    }

    fn transition(sandbox: &Sandbox) -> SchoolYearTransition {
        transition_with_gate(sandbox, 2)
    }

    fn transition_with_gate(sandbox: &Sandbox, gate_size: usize) -> SchoolYearTransition {
        SchoolYearTransition::new(sandbox.collaborators(), ProcessManager::default(), gate_size)
    }

    #[tokio::test]
    async fn test_transition_archives_creates_and_switches() {
        let sandbox = sandbox();
        let transition = transition(&sandbox);
        let result = transition
            .run_transition(
                request(&["Math 2025", "Art 2025"]),
                BulkOperationOptions::default(),
                AuthContext::system(),
            )
            .await;

        assert_eq!(result.status, ProcessStatus::Completed, "{:?}", result.errors);
        assert_eq!(result.operation_type, ProcessType::SchoolYearTransition);
        let operations: Vec<&str> = result
            .successful_operations
            .iter()
            .map(|s| s.operation.as_str())
            .collect();
        assert_eq!(
            operations,
            vec![
                "CreateSchoolYear",
                "ArchiveTeam",
                "ArchiveTeam",
                "CreateTeam",
                "CreateTeam",
                "ActivateSchoolYear",
                "DeactivateSchoolYear"
            ]
        );

        // One process for the transition plus one per phase.
        let process = transition
            .manager()
            .get_process(result.process_id.unwrap())
            .unwrap();
        assert_eq!(process.status, ProcessStatus::Completed);
        assert_eq!(process.affected_entity_ids[0], "y-2024");
        assert_eq!((process.processed_items, process.failed_items), (2, 0));
        assert_eq!(transition.manager().list_processes().len(), 3);
        assert_eq!(transition.gate().available_permits(), 2);

        let snapshot = sandbox.directory.snapshot().await;
        let new_year = snapshot.school_years.iter().find(|y| y.name == "2025/26").unwrap();
        assert!(new_year.active);
        assert!(!snapshot.school_years[0].active);
        assert_eq!(
            snapshot
                .teams
                .iter()
                .filter(|t| t.school_year_id.as_deref() == Some(new_year.id.as_str()))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_transition_without_phases_is_still_a_process() {
        // The old year has no teams and there are no templates.
        let sandbox = Sandbox::from_snapshot(DirectorySnapshot {
            teams: Vec::new(),
            ..sandbox().directory.snapshot().await
        });
        let transition = transition_with_gate(&sandbox, 1);

        let result = transition
            .run_transition(request(&[]), BulkOperationOptions::default(), AuthContext::system())
            .await;

        assert_eq!(result.status, ProcessStatus::Completed);
        let process_id = result.process_id.expect("transition registers a process");
        let processes = transition.manager().list_processes();
        assert_eq!(processes.len(), 1);
        assert_eq!(processes[0].id, process_id);
        assert_eq!(processes[0].status, ProcessStatus::Completed);
        assert!(processes[0].completed_at.is_some());
        // Create, activate and deactivate all happened under that process.
        assert_eq!(sandbox.directory.mutation_count(), 3);

        let audit = sandbox.audit.records().await;
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].status, ProcessStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_source_year_is_rejected() {
        let sandbox = sandbox();
        let transition = transition(&sandbox);
        let mut request = request(&[]);
        request.from_school_year_id = "y-1999".to_string();
        let result = transition
            .run_transition(request, BulkOperationOptions::default(), AuthContext::system())
            .await;

        assert_eq!(result.status, ProcessStatus::Failed);
        assert!(result.process_id.is_none());
        assert!(transition.manager().list_processes().is_empty());
        assert_eq!(sandbox.directory.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_year_creation_fails_the_process() {
        let sandbox = sandbox();
        sandbox.directory.fail_writes_for("2025/26").await;
        let transition = transition(&sandbox);

        let result = transition
            .run_transition(
                request(&["Math 2025"]),
                BulkOperationOptions::default(),
                AuthContext::system(),
            )
            .await;

        assert_eq!(result.status, ProcessStatus::Failed);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors[0].operation, "CreateSchoolYear");

        let process = transition
            .manager()
            .get_process(result.process_id.unwrap())
            .unwrap();
        assert_eq!(process.status, ProcessStatus::Failed);
        assert!(process.error_message.unwrap().contains("write to 2025/26 failed"));
        assert_eq!(process.failed_items, 1);
        assert_eq!(transition.manager().list_processes().len(), 1);
        assert_eq!(sandbox.directory.mutation_count(), 0);
        assert_eq!(transition.gate().available_permits(), 2);
    }

    #[tokio::test]
    async fn test_failed_archive_phase_skips_creation() {
        let sandbox = sandbox();
        let transition = transition(&sandbox);
        transition.archive.gate().close();

        let result = transition
            .run_transition(
                request(&["Math 2025"]),
                BulkOperationOptions::default(),
                AuthContext::system(),
            )
            .await;

        assert_eq!(result.status, ProcessStatus::Failed);
        assert!(!result
            .successful_operations
            .iter()
            .any(|s| s.operation == "CreateTeam"));
        let process = transition
            .manager()
            .get_process(result.process_id.unwrap())
            .unwrap();
        assert!(process.error_message.unwrap().contains("archive phase failed"));
        // Only the new school year was written; it stays inactive.
        assert_eq!(sandbox.directory.mutation_count(), 1);
        let snapshot = sandbox.directory.snapshot().await;
        assert!(snapshot.school_years[0].active);
    }

    #[tokio::test]
    async fn test_transition_waits_for_gate_and_can_be_cancelled() {
        let sandbox = sandbox();
        let transition = transition_with_gate(&sandbox, 1);
        let holder = transition
            .gate()
            .acquire(&CancellationToken::new())
            .await
            .unwrap();

        let canceller = async {
            loop {
                if let Some(process) = transition.list_active_processes().first() {
                    assert!(transition.cancel_process(process.id));
                    return process.id;
                }
                tokio::task::yield_now().await;
            }
        };
        let (result, cancelled_id) = tokio::join!(
            transition.run_transition(
                request(&["Math 2025"]),
                BulkOperationOptions::default(),
                AuthContext::system(),
            ),
            canceller
        );

        assert_eq!(result.status, ProcessStatus::Cancelled);
        assert_eq!(result.process_id, Some(cancelled_id));
        assert!(result.successful_operations.is_empty());
        assert_eq!(sandbox.directory.mutation_count(), 0);
        assert_eq!(
            transition.manager().get_process(cancelled_id).unwrap().status,
            ProcessStatus::Cancelled
        );
        assert_eq!(transition.gate().available_permits(), 0);
        drop(holder);
        assert_eq!(transition.gate().available_permits(), 1);
    }

    #[tokio::test]
    async fn test_cancelling_transition_stops_running_phase() {
        let sandbox = sandbox();
        sandbox.directory.set_latency(Duration::from_millis(20));
        let transition = transition(&sandbox);
        let options = BulkOperationOptions {
            batch_size: 1,
            ..Default::default()
        };

        let canceller = async {
            loop {
                let active = transition.list_active_processes();
                // The transition plus its running archive phase.
                if active.len() == 2 {
                    let parent = active
                        .iter()
                        .find(|p| p.affected_entity_ids.contains(&"y-2024".to_string()))
                        .unwrap();
                    assert!(transition.cancel_process(parent.id));
                    return parent.id;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        let (result, parent_id) = tokio::join!(
            transition.run_transition(request(&["Math 2025"]), options, AuthContext::system()),
            canceller
        );

        assert_eq!(result.status, ProcessStatus::Cancelled);
        assert_eq!(result.process_id, Some(parent_id));
        assert!(!result
            .successful_operations
            .iter()
            .any(|s| s.operation == "CreateTeam" || s.operation == "ActivateSchoolYear"));
        assert!(transition.list_active_processes().is_empty());
        assert!(transition
            .manager()
            .list_processes()
            .iter()
            .all(|p| p.status == ProcessStatus::Cancelled));

        let snapshot = sandbox.directory.snapshot().await;
        assert!(snapshot.school_years[0].active);
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let sandbox = sandbox();
        let options = BulkOperationOptions {
            dry_run: true,
            ..Default::default()
        };
        let transition = transition(&sandbox);
        let result = transition
            .run_transition(request(&["Math 2025"]), options, AuthContext::system())
            .await;

        assert_eq!(result.status, ProcessStatus::Completed);
        assert!(result.process_id.is_some());
        assert_eq!(sandbox.directory.mutation_count(), 0);
    }
}
