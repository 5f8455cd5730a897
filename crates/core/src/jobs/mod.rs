//! The five bulk orchestrators.
//!
//! Each orchestrator owns one concurrency gate, shares the process manager
//! with the others, and drives its job kinds through a [`JobEngine`].
//!
//! [`JobEngine`]: crate::engine::JobEngine

pub mod health;
pub mod lifecycle;
pub mod onboarding;
pub mod reporting;
pub mod school_year;

pub use health::HealthMonitor;
pub use lifecycle::TeamLifecycle;
pub use onboarding::UserProvisioning;
pub use reporting::ReportExporter;
pub use school_year::SchoolYearTransition;

use crate::collaborators::{CollaboratorError, Collaborators};
use crate::state::manager::ProcessManager;
use bk_protocol::config_models::{GlobalConfig, JobSpec};
use bk_protocol::job_models::{AuthContext, BulkOperationOptions, HealthReport};
use bk_protocol::process_models::{Process, ProcessType};
use bk_protocol::result_models::{BulkOperationResult, EntityRef, OperationError};
use serde::Serialize;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Surface every orchestrator exposes besides its `run_*` methods.
pub trait Orchestrator {
    /// Process types this orchestrator creates.
    fn process_types(&self) -> &'static [ProcessType];

    fn manager(&self) -> &ProcessManager;

    /// Running jobs of this orchestrator.
    fn list_active_processes(&self) -> Vec<Process> {
        let types = self.process_types();
        self.manager()
            .list_active_processes()
            .into_iter()
            .filter(|p| types.contains(&p.process_type))
            .collect()
    }

    /// Request cancellation of one of this orchestrator's running jobs.
    ///
    /// Returns `false` for unknown ids, finished jobs and jobs owned by
    /// another orchestrator.
    fn cancel_process(&self, id: Uuid) -> bool {
        let owned = self
            .manager()
            .get_process(id)
            .is_some_and(|p| self.process_types().contains(&p.process_type));
        owned && self.manager().cancel_process(id)
    }
}

/// Every orchestrator, wired to one shared process manager.
pub struct Orchestrators {
    pub provisioning: UserProvisioning,
    pub lifecycle: TeamLifecycle,
    pub school_year: SchoolYearTransition,
    pub health: HealthMonitor,
    pub reporting: ReportExporter,
    manager: ProcessManager,
}

impl Orchestrators {
    /// Build all orchestrators with gate sizes and thresholds from `config`.
    pub fn new(
        collaborators: Collaborators,
        manager: ProcessManager,
        config: &GlobalConfig,
    ) -> Self {
        let gates = &config.gates;
        info!(
            onboarding = gates.onboarding,
            lifecycle = gates.lifecycle,
            school_year = gates.school_year,
            health = gates.health,
            reporting = gates.reporting,
            "building orchestrators"
        );
        Self {
            provisioning: UserProvisioning::new(
                collaborators.clone(),
                manager.clone(),
                gates.onboarding,
            ),
            lifecycle: TeamLifecycle::new(collaborators.clone(), manager.clone(), gates.lifecycle),
            school_year: SchoolYearTransition::new(
                collaborators.clone(),
                manager.clone(),
                gates.school_year,
            ),
            health: HealthMonitor::new(
                collaborators.clone(),
                manager.clone(),
                gates.health,
                Duration::from_millis(config.health.degraded_threshold_ms),
                Duration::from_millis(config.health.check_timeout_ms),
            ),
            reporting: ReportExporter::new(collaborators, manager.clone(), gates.reporting),
            manager,
        }
    }

    pub fn manager(&self) -> &ProcessManager {
        &self.manager
    }

    /// Hand `spec` to the orchestrator that owns its operation.
    pub async fn run(
        &self,
        spec: JobSpec,
        options: BulkOperationOptions,
        auth: AuthContext,
    ) -> JobOutput {
        let result = match spec {
            JobSpec::Onboarding(plans) => {
                self.provisioning.run_onboarding(plans, options, auth).await
            }
            JobSpec::Offboarding(plans) => {
                self.provisioning.run_offboarding(plans, options, auth).await
            }
            JobSpec::ArchiveTeams(ids) => self.lifecycle.run_archive(ids, options, auth).await,
            JobSpec::RestoreTeams(requests) => {
                self.lifecycle.run_restore(requests, options, auth).await
            }
            JobSpec::MigrateTeams(migrations) => {
                self.lifecycle.run_migrate(migrations, options, auth).await
            }
            JobSpec::ConsolidateTeams(consolidations) => {
                self.lifecycle
                    .run_consolidate(consolidations, options, auth)
                    .await
            }
            JobSpec::SchoolYearTransition(request) => {
                self.school_year.run_transition(request, options, auth).await
            }
            JobSpec::HealthCheck(components) => {
                return JobOutput::Health(
                    self.health.run_health_check(components, options, auth).await,
                )
            }
            JobSpec::HealthRepair(components) => {
                self.health.run_repair(components, options, auth).await
            }
            JobSpec::Report(request) => self.reporting.run_report(request, options, auth).await,
        };
        JobOutput::Bulk(result)
    }
}

/// What [`Orchestrators::run`] returns: health checks carry a full report.
#[derive(Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum JobOutput {
    Bulk(BulkOperationResult),
    Health(HealthReport),
}

impl JobOutput {
    pub fn result(&self) -> &BulkOperationResult {
        match self {
            Self::Bulk(result) => result,
            Self::Health(report) => &report.result,
        }
    }
}

/// Error entry for a collaborator call that failed during a step.
pub(crate) fn step_error(
    operation: &str,
    entity: &EntityRef,
    message: impl Into<String>,
    cause: CollaboratorError,
) -> OperationError {
    OperationError::new(operation, entity, message).with_cause(cause)
}
