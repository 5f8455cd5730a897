//! Health checks and automated repair of system components.
//!
//! Each work item is a [`SystemComponent`]. A check measures how long the
//! check took and classifies the component as Healthy, Degraded (slow or
//! warning) or Unhealthy (check failed, timed out or reported unhealthy).
//! The measurements travel as `details` on the result entries and are
//! turned into a [`HealthReport`] with recommendations.

use crate::collaborators::{Collaborators, HealthChecker};
use crate::engine::batch::{BatchReport, ItemOutcome};
use crate::engine::error::EngineResult;
use crate::engine::gate::ConcurrencyGate;
use crate::engine::job::{ItemValidation, JobContext, JobKind};
use crate::engine::JobEngine;
use crate::jobs::{step_error, Orchestrator};
use crate::state::manager::ProcessManager;
use async_trait::async_trait;
use bk_protocol::job_models::{
    AuthContext, BulkOperationOptions, ComponentHealth, HealthReport, HealthStatus,
    SystemComponent,
};
use bk_protocol::process_models::ProcessType;
use bk_protocol::result_models::{BulkOperationResult, EntityRef, OperationError, OperationSuccess};
use std::time::{Duration, Instant};
use tracing::debug;

pub struct HealthMonitor {
    check: JobEngine<HealthCheckJob>,
    repair: JobEngine<HealthRepairJob>,
    manager: ProcessManager,
}

impl HealthMonitor {
    pub fn new(
        collaborators: Collaborators,
        manager: ProcessManager,
        gate_size: usize,
        degraded_threshold: Duration,
        check_timeout: Duration,
    ) -> Self {
        let gate = ConcurrencyGate::new(gate_size);
        let settings = CheckSettings {
            degraded_threshold,
            check_timeout,
        };
        Self {
            check: JobEngine::new(
                HealthCheckJob { settings },
                gate.clone(),
                manager.clone(),
                collaborators.clone(),
            ),
            repair: JobEngine::new(
                HealthRepairJob { settings },
                gate,
                manager.clone(),
                collaborators,
            ),
            manager,
        }
    }

    /// Check `components` (every component when empty).
    pub async fn run_health_check(
        &self,
        components: Vec<SystemComponent>,
        options: BulkOperationOptions,
        auth: AuthContext,
    ) -> HealthReport {
        let components = if components.is_empty() {
            SystemComponent::all()
        } else {
            components
        };
        let requested = components.len();
        let result = self.check.run(components, options, auth).await;
        build_report(result, requested)
    }

    /// Repair `components` and verify each repair with a fresh check.
    pub async fn run_repair(
        &self,
        components: Vec<SystemComponent>,
        options: BulkOperationOptions,
        auth: AuthContext,
    ) -> BulkOperationResult {
        self.repair.run(components, options, auth).await
    }
}

impl Orchestrator for HealthMonitor {
    fn process_types(&self) -> &'static [ProcessType] {
        &[ProcessType::HealthCheck, ProcessType::HealthRepair]
    }

    fn manager(&self) -> &ProcessManager {
        &self.manager
    }
}

#[derive(Debug, Clone, Copy)]
struct CheckSettings {
    degraded_threshold: Duration,
    check_timeout: Duration,
}

impl CheckSettings {
    /// Run one check and classify the answer.
    async fn measure(
        &self,
        checker: &dyn HealthChecker,
        component: SystemComponent,
    ) -> ComponentHealth {
        let started = Instant::now();
        let answer = tokio::time::timeout(self.check_timeout, checker.check(component)).await;
        let elapsed = started.elapsed();
        let duration_ms = elapsed.as_millis() as u64;

        let (status, message) = match answer {
            Err(_) => (
                HealthStatus::Unhealthy,
                format!("No answer within {} ms", self.check_timeout.as_millis()),
            ),
            Ok(Err(e)) => (HealthStatus::Unhealthy, e.to_string()),
            Ok(Ok(report)) if !report.healthy => (HealthStatus::Unhealthy, report.message),
            Ok(Ok(report)) if !report.warnings.is_empty() => {
                (HealthStatus::Degraded, report.warnings.join("; "))
            }
            Ok(Ok(_)) if elapsed > self.degraded_threshold => (
                HealthStatus::Degraded,
                format!(
                    "Responded in {duration_ms} ms (threshold {} ms)",
                    self.degraded_threshold.as_millis()
                ),
            ),
            Ok(Ok(report)) => (HealthStatus::Healthy, report.message),
        };
        debug!(component = component.label(), ?status, duration_ms, "component checked");

        ComponentHealth {
            component,
            status,
            duration_ms,
            message,
        }
    }
}

fn component_ref(component: SystemComponent) -> EntityRef {
    EntityRef::new(component.label(), component.label())
}

fn health_details(health: &ComponentHealth) -> serde_json::Value {
    serde_json::to_value(health).unwrap_or(serde_json::Value::Null)
}

pub struct HealthCheckJob {
    settings: CheckSettings,
}

#[async_trait]
impl JobKind for HealthCheckJob {
    type Item = SystemComponent;

    fn process_type(&self) -> ProcessType {
        ProcessType::HealthCheck
    }

    fn operation_name(&self) -> &'static str {
        "CheckComponent"
    }

    fn item_ref(&self, component: &SystemComponent) -> EntityRef {
        component_ref(*component)
    }

    /// Health checks must run even when the directory is down.
    async fn preflight(&self, _ctx: &JobContext) -> EngineResult<()> {
        Ok(())
    }

    async fn process_item(&self, component: &SystemComponent, ctx: &JobContext) -> ItemOutcome {
        let health = self
            .settings
            .measure(ctx.collaborators.health.as_ref(), *component)
            .await;
        let entity = component_ref(*component);
        let details = health_details(&health);
        match health.status {
            HealthStatus::Unhealthy => ItemOutcome::failure(
                OperationError::new("CheckComponent", &entity, health.message.clone())
                    .with_details(details),
            ),
            _ => ItemOutcome::success(
                OperationSuccess::new("CheckComponent", &entity, health.message.clone())
                    .with_details(details),
            ),
        }
    }
}

pub struct HealthRepairJob {
    settings: CheckSettings,
}

#[async_trait]
impl JobKind for HealthRepairJob {
    type Item = SystemComponent;

    fn process_type(&self) -> ProcessType {
        ProcessType::HealthRepair
    }

    fn operation_name(&self) -> &'static str {
        "RepairComponent"
    }

    fn item_ref(&self, component: &SystemComponent) -> EntityRef {
        component_ref(*component)
    }

    async fn preflight(&self, _ctx: &JobContext) -> EngineResult<()> {
        Ok(())
    }

    async fn validate_item(&self, component: &SystemComponent, ctx: &JobContext) -> ItemValidation {
        let health = self
            .settings
            .measure(ctx.collaborators.health.as_ref(), *component)
            .await;
        if health.status == HealthStatus::Healthy {
            ItemValidation::Skip(
                OperationError::new(
                    "RepairComponent",
                    &component_ref(*component),
                    "Component is healthy; nothing to repair",
                )
                .with_details(health_details(&health)),
            )
        } else {
            ItemValidation::Accept
        }
    }

    async fn process_item(&self, component: &SystemComponent, ctx: &JobContext) -> ItemOutcome {
        let entity = component_ref(*component);
        if ctx.is_dry_run() {
            return ItemOutcome::success(OperationSuccess::new(
                "RepairComponent",
                &entity,
                "Would attempt repair",
            ));
        }
        match ctx.collaborators.health.repair(*component).await {
            Ok(action) => ItemOutcome::success(OperationSuccess::new(
                "RepairComponent",
                &entity,
                action,
            )),
            Err(e) => ItemOutcome::failure(step_error(
                "RepairComponent",
                &entity,
                "Repair failed",
                e,
            )),
        }
    }

    /// Re-check every component that reported a successful repair.
    async fn cleanup(&self, ctx: &JobContext, report: &BatchReport) -> ItemOutcome {
        let mut outcome = ItemOutcome::default();
        if ctx.is_dry_run() {
            return outcome;
        }
        let repaired = SystemComponent::all().into_iter().filter(|c| {
            report
                .successes
                .iter()
                .any(|s| s.operation == "RepairComponent" && s.entity_id == c.label())
        });
        for component in repaired {
            let health = self
                .settings
                .measure(ctx.collaborators.health.as_ref(), component)
                .await;
            let entity = component_ref(component);
            let details = health_details(&health);
            if health.status == HealthStatus::Unhealthy {
                outcome.push_error(
                    OperationError::new(
                        "VerifyRepair",
                        &entity,
                        format!("Still unhealthy after repair: {}", health.message),
                    )
                    .with_details(details),
                );
            } else {
                outcome.push_success(
                    OperationSuccess::new("VerifyRepair", &entity, "Component recovered")
                        .with_details(details),
                );
            }
        }
        outcome
    }
}

/// Turn a health-check result into a report.
///
/// Components that were never measured (the job was cancelled or failed)
/// make the overall status at least Degraded.
pub fn build_report(result: BulkOperationResult, requested: usize) -> HealthReport {
    let mut components: Vec<ComponentHealth> = result
        .successful_operations
        .iter()
        .filter_map(|s| s.details.clone())
        .chain(result.errors.iter().filter_map(|e| e.details.clone()))
        .filter_map(|details| serde_json::from_value(details).ok())
        .collect();
    components.sort_by_key(|c| {
        SystemComponent::all()
            .iter()
            .position(|known| *known == c.component)
    });

    let mut overall = components
        .iter()
        .map(|c| c.status)
        .max()
        .unwrap_or(HealthStatus::Unhealthy);
    if components.len() < requested {
        overall = overall.max(HealthStatus::Degraded);
    }
    let recommendations = recommendations(&components);

    HealthReport {
        result,
        overall,
        components,
        recommendations,
    }
}

/// Suggested follow-ups for every component that is not healthy.
pub fn recommendations(components: &[ComponentHealth]) -> Vec<String> {
    let mut advice: Vec<String> = components
        .iter()
        .filter(|c| c.status != HealthStatus::Healthy)
        .map(|c| {
            let action = match (c.component, c.status) {
                (SystemComponent::Database, HealthStatus::Unhealthy) => {
                    "check database connectivity and credentials"
                }
                (SystemComponent::Database, _) => "review slow queries and connection pool size",
                (SystemComponent::DirectoryApi, HealthStatus::Unhealthy) => {
                    "verify the directory API credentials and tenant availability"
                }
                (SystemComponent::DirectoryApi, _) => {
                    "reduce batch sizes; the directory API is throttling or slow"
                }
                (SystemComponent::DirectorySync, _) => "run a full directory synchronization",
                (SystemComponent::Cache, _) => "flush the cache and check its memory limits",
                (SystemComponent::NotificationService, _) => {
                    "check the notification service; users are not being informed"
                }
                (SystemComponent::AuditLog, _) => {
                    "check audit log storage; operation history may be incomplete"
                }
            };
            format!("{}: {} ({})", c.component.label(), action, c.message)
        })
        .collect();
    if advice.is_empty() && !components.is_empty() {
        advice.push("All components are healthy; no action required".to_string());
    }
    advice
}
