//! Bulk job execution engine.
//!
//! The [`JobEngine`] runs one [`JobKind`] through the common pipeline shared
//! by every orchestrator: request validation, registration, gate admission,
//! preflight, per-item validation, batched processing, cleanup and
//! finalization. Per-item failures (including panics) never escape an item;
//! only orchestrator-level problems turn a job `Failed`.

pub mod aggregator;
pub mod batch;
pub mod error;
pub mod gate;
pub mod job;

use crate::collaborators::{AuditEntry, Collaborators};
use crate::state::manager::ProcessManager;
use crate::state::process::{
    cancel_process, complete_process, create_process, fail_process, record_items,
};
use aggregator::{resolve_status, summary, ResultAggregator};
use batch::{BatchRunner, ItemOutcome};
use bk_protocol::ipc::NotificationSeverity;
use bk_protocol::job_models::{AuthContext, BulkOperationOptions};
use bk_protocol::process_models::{Process, ProcessStatus};
use bk_protocol::result_models::{BulkOperationResult, EntityRef, OperationError};
use error::{EngineError, EngineResult};
use futures::FutureExt;
use gate::ConcurrencyGate;
use job::{ItemValidation, JobContext, JobKind};
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A request that passed whole-request validation and owns a process.
struct Admitted<I> {
    process_id: Uuid,
    token: CancellationToken,
    items: Vec<(I, EntityRef)>,
    duplicates: Vec<OperationError>,
    options: BulkOperationOptions,
    auth: AuthContext,
}

/// Handle to a job started with [`JobEngine::spawn`].
pub struct JobHandle {
    /// `None` when the request was rejected before a process was created.
    pub process_id: Option<Uuid>,
    handle: JoinHandle<BulkOperationResult>,
}

impl JobHandle {
    /// Wait for the job to finish.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Aborted`] if the job task was lost.
    pub async fn wait(self) -> EngineResult<BulkOperationResult> {
        self.handle
            .await
            .map_err(|e| EngineError::Aborted(e.to_string()))
    }
}

/// Runs jobs of one kind under a shared gate and process manager.
pub struct JobEngine<J: JobKind> {
    job: J,
    gate: ConcurrencyGate,
    manager: ProcessManager,
    collaborators: Collaborators,
}

impl<J: JobKind> JobEngine<J> {
    /// Create a new JobEngine.
    ///
    /// # Arguments
    ///
    /// * `job` - The job kind to run
    /// * `gate` - Concurrency gate of the owning orchestrator (shared by its job kinds)
    /// * `manager` - Process manager shared by every orchestrator
    /// * `collaborators` - External services the job calls into
    pub fn new(
        job: J,
        gate: ConcurrencyGate,
        manager: ProcessManager,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            job,
            gate,
            manager,
            collaborators,
        }
    }

    pub fn job(&self) -> &J {
        &self.job
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn manager(&self) -> &ProcessManager {
        &self.manager
    }

    /// Run a bulk job to completion and return its result.
    ///
    /// This is the main entry point. It:
    /// 1. Validates the request as a whole (rejections create no process)
    /// 2. Registers the process and its cancellation token
    /// 3. Waits for a gate slot (cancellable)
    /// 4. Runs preflight, per-item validation and the batched items
    /// 5. Runs cleanup, settles the status, notifies the initiator
    ///
    /// The call never fails: every problem is reported inside the result.
    pub async fn run(
        &self,
        items: Vec<J::Item>,
        options: BulkOperationOptions,
        auth: AuthContext,
    ) -> BulkOperationResult {
        match self.admit(items, options, auth, None) {
            Ok(admitted) => self.execute(admitted).await,
            Err(rejected) => rejected,
        }
    }

    /// Run a bulk job as one phase of a larger process.
    ///
    /// Behaves like [`JobEngine::run`], but the job's token is a child of
    /// `parent`, so cancelling the parent process also stops this phase.
    pub async fn run_child(
        &self,
        items: Vec<J::Item>,
        options: BulkOperationOptions,
        auth: AuthContext,
        parent: &CancellationToken,
    ) -> BulkOperationResult {
        match self.admit(items, options, auth, Some(parent)) {
            Ok(admitted) => self.execute(admitted).await,
            Err(rejected) => rejected,
        }
    }

    /// Start a bulk job in the background.
    ///
    /// The process is registered before this returns, so the id in the
    /// handle can be polled or cancelled right away.
    pub fn spawn(
        self: &Arc<Self>,
        items: Vec<J::Item>,
        options: BulkOperationOptions,
        auth: AuthContext,
    ) -> JobHandle {
        match self.admit(items, options, auth, None) {
            Ok(admitted) => {
                let process_id = Some(admitted.process_id);
                let engine = Arc::clone(self);
                let handle = tokio::spawn(async move { engine.execute(admitted).await });
                JobHandle { process_id, handle }
            }
            Err(rejected) => JobHandle {
                process_id: None,
                handle: tokio::spawn(async move { rejected }),
            },
        }
    }

    pub fn list_active_processes(&self) -> Vec<Process> {
        self.manager.list_active_processes()
    }

    pub fn cancel_process(&self, id: Uuid) -> bool {
        self.manager.cancel_process(id)
    }

    /// Whole-request validation, duplicate detection and registration.
    fn admit(
        &self,
        items: Vec<J::Item>,
        options: BulkOperationOptions,
        auth: AuthContext,
        parent: Option<&CancellationToken>,
    ) -> Result<Admitted<J::Item>, BulkOperationResult> {
        let process_type = self.job.process_type();
        if let Err(message) = self.job.validate_request(&items) {
            info!(%process_type, reason = %message, "request rejected");
            let entity = EntityRef::new("request", process_type.label());
            let error = OperationError::new(self.job.validation_operation(), &entity, message);
            return Err(ResultAggregator::rejected(process_type, error));
        }

        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(items.len());
        let mut duplicates = Vec::new();
        let mut affected = Vec::with_capacity(items.len());
        for item in items {
            let entity = self.job.item_ref(&item);
            affected.push(entity.id.clone());
            if seen.insert(entity.id.clone()) {
                unique.push((item, entity));
            } else {
                duplicates.push(OperationError::new(
                    self.job.validation_operation(),
                    &entity,
                    "Duplicate item in request; only the first occurrence is processed",
                ));
            }
        }

        let process = create_process(process_type, affected, auth.user_id.clone());
        let process_id = process.id;
        let token = match parent {
            Some(parent) => self.manager.begin_child(process, parent),
            None => self.manager.begin(process),
        };
        Ok(Admitted {
            process_id,
            token,
            items: unique,
            duplicates,
            options,
            auth,
        })
    }

    async fn execute(&self, admitted: Admitted<J::Item>) -> BulkOperationResult {
        let process_type = self.job.process_type();
        let span = info_span!("bulk_job", process_id = %admitted.process_id, %process_type);
        self.execute_inner(admitted).instrument(span).await
    }

    async fn execute_inner(&self, admitted: Admitted<J::Item>) -> BulkOperationResult {
        let Admitted {
            process_id,
            token,
            items,
            duplicates,
            options,
            auth,
        } = admitted;
        let process_type = self.job.process_type();
        let ctx = JobContext::new(
            process_id,
            options,
            auth,
            self.collaborators.clone(),
            token.clone(),
            self.manager.clone(),
        );

        let mut aggregator = ResultAggregator::new(process_type, Some(process_id));
        if !duplicates.is_empty() {
            let count = duplicates.len();
            self.manager.update(process_id, |p| record_items(p, 0, count));
            for duplicate in duplicates {
                aggregator.add_error(duplicate);
            }
        }

        let audit_id = self.open_audit(&ctx, items.len()).await;

        self.manager
            .report_progress(process_id, "Waiting for execution slot", None);
        let outcome = match self.gate.acquire(&token).await {
            Ok(permit) => {
                debug!(
                    in_use = self.gate.in_use(),
                    capacity = self.gate.capacity(),
                    "admitted by gate"
                );
                let admitted = AssertUnwindSafe(self.run_admitted(&ctx, &items, &mut aggregator))
                    .catch_unwind()
                    .await;
                drop(permit);
                admitted.unwrap_or_else(|panic| Err(EngineError::Aborted(panic_message(panic))))
            }
            Err(e) => Err(e),
        };

        let status = match outcome {
            Ok(()) => {
                let has_errors = aggregator.has_errors();
                // The token also fires when a parent process is cancelled.
                let cancelled = token.is_cancelled();
                self.manager.update(process_id, |p| {
                    if cancelled {
                        cancel_process(p)
                    } else {
                        complete_process(p, has_errors)
                    }
                });
                resolve_status(cancelled, has_errors)
            }
            Err(EngineError::Cancelled) => {
                self.manager.update(process_id, cancel_process);
                ProcessStatus::Cancelled
            }
            Err(e) => {
                error!(error = %e, "job failed");
                let entity = EntityRef::new(process_id.to_string(), process_type.label());
                aggregator.add_error(OperationError::new(
                    self.job.operation_name(),
                    &entity,
                    e.to_string(),
                ));
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
            "job finished"
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
        ctx.notify(&ctx.auth.user_id, &text, severity_for(status))
            .await;
        self.manager.finish(process_id);
        result
    }

    /// Everything that happens while the job holds a gate slot.
    async fn run_admitted(
        &self,
        ctx: &JobContext,
        items: &[(J::Item, EntityRef)],
        aggregator: &mut ResultAggregator,
    ) -> EngineResult<()> {
        let process_id = ctx.process_id;
        self.manager.report_progress(process_id, "Validating", None);
        self.job.preflight(ctx).await?;

        let mut accepted = Vec::with_capacity(items.len());
        for entry in items {
            if ctx.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            match self.job.validate_item(&entry.0, ctx).await {
                ItemValidation::Accept => accepted.push(entry),
                ItemValidation::Skip(warning) => {
                    debug!(entity_id = %entry.1.id, reason = %warning.message, "item skipped");
                    self.manager.update(process_id, |p| record_items(p, 1, 0));
                    aggregator.add_warning(warning);
                }
                ItemValidation::Reject(error) => {
                    debug!(entity_id = %entry.1.id, reason = %error.message, "item rejected");
                    self.manager.update(process_id, |p| record_items(p, 0, 1));
                    aggregator.add_error(error);
                }
            }
        }

        self.manager.report_progress(process_id, "Processing", None);
        let job = &self.job;
        let manager = &self.manager;
        let report = BatchRunner::from_options(&ctx.options)
            .run(
                &accepted,
                &ctx.token,
                move |entry| async move {
                    let (item, entity) = *entry;
                    match AssertUnwindSafe(job.process_item(item, ctx))
                        .catch_unwind()
                        .await
                    {
                        Ok(outcome) => outcome,
                        Err(panic) => {
                            let cause = panic_message(panic);
                            error!(entity_id = %entity.id, %cause, "item panicked");
                            ItemOutcome::failure(
                                OperationError::new(
                                    job.operation_name(),
                                    entity,
                                    "Unexpected failure while processing item",
                                )
                                .with_cause(cause),
                            )
                        }
                    }
                },
                move |progress| async move {
                    let percent = manager
                        .update(process_id, |p| {
                            record_items(p, progress.batch_succeeded, progress.batch_failed);
                            p.progress_percent
                        })
                        .unwrap_or_else(|| progress.percent());
                    let label = format!(
                        "Processed batch {}/{}",
                        progress.batch_index, progress.batch_count
                    );
                    ctx.report_phase(&label, percent).await;
                },
            )
            .await;
        debug!(stop_reason = ?report.stop_reason, attempted = report.attempted, "batches finished");

        if !ctx.is_cancelled() {
            self.manager.report_progress(process_id, "Cleaning up", None);
            let cleanup = self.job.cleanup(ctx, &report).await;
            aggregator.add_outcome(cleanup);
        }
        aggregator.add_batch_report(report);
        Ok(())
    }

    async fn open_audit(&self, ctx: &JobContext, item_count: usize) -> Option<Uuid> {
        let entry = AuditEntry {
            process_id: ctx.process_id,
            process_type: self.job.process_type(),
            initiated_by: ctx.auth.user_id.clone(),
            description: self.job.describe(item_count),
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

pub(crate) fn severity_for(status: ProcessStatus) -> NotificationSeverity {
    match status {
        ProcessStatus::Completed => NotificationSeverity::Success,
        ProcessStatus::CompletedWithErrors | ProcessStatus::Cancelled => {
            NotificationSeverity::Warning
        }
        ProcessStatus::Failed => NotificationSeverity::Error,
        ProcessStatus::Running => NotificationSeverity::Info,
    }
}

pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
