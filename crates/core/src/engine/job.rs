//! The seam between the generic engine and the concrete job kinds.
//!
//! Every orchestrator implements [`JobKind`] for each of its operations. The
//! engine owns the common pipeline (registration, gate, batching,
//! aggregation, notification); a job kind only says how one item is
//! validated and processed.

use crate::collaborators::{Collaborators, DirectoryService, EntityChangeKind};
use crate::engine::batch::{BatchReport, ItemOutcome};
use crate::engine::error::{EngineError, EngineResult};
use crate::state::manager::ProcessManager;
use async_trait::async_trait;
use bk_protocol::ipc::NotificationSeverity;
use bk_protocol::job_models::{AuthContext, BulkOperationOptions};
use bk_protocol::process_models::ProcessType;
use bk_protocol::result_models::{EntityRef, OperationError};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

/// Verdict of the per-item validation phase.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemValidation {
    /// Process the item.
    Accept,
    /// Leave the item out without counting it as a failure ("already archived").
    Skip(OperationError),
    /// Leave the item out and record the error.
    Reject(OperationError),
}

/// Everything a job kind may use while it runs.
pub struct JobContext {
    pub process_id: Uuid,
    pub options: BulkOperationOptions,
    pub auth: AuthContext,
    pub collaborators: Collaborators,
    pub token: CancellationToken,
    manager: ProcessManager,
}

impl JobContext {
    pub(crate) fn new(
        process_id: Uuid,
        options: BulkOperationOptions,
        auth: AuthContext,
        collaborators: Collaborators,
        token: CancellationToken,
        manager: ProcessManager,
    ) -> Self {
        Self {
            process_id,
            options,
            auth,
            collaborators,
            token,
            manager,
        }
    }

    pub fn directory(&self) -> &dyn DirectoryService {
        self.collaborators.directory.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Move a phase-driven job to `label` at `percent` and tell the initiator.
    pub async fn report_phase(&self, label: &str, percent: u8) {
        self.manager.report_progress(self.process_id, label, Some(percent));
        let percent = self
            .manager
            .get_process(self.process_id)
            .map(|p| p.progress_percent)
            .unwrap_or(percent);
        if let Err(e) = self
            .collaborators
            .notifications
            .notify_progress(&self.auth.user_id, self.process_id, percent, label)
            .await
        {
            warn!(process_id = %self.process_id, error = %e, "progress notification failed");
        }
    }

    pub async fn invalidate(&self, kind: EntityChangeKind, entity: &EntityRef) {
        self.collaborators.cache.invalidate_for(kind, entity).await;
    }

    /// Send a message to `recipient`. Delivery failures are logged, not propagated.
    pub async fn notify(&self, recipient: &str, message: &str, severity: NotificationSeverity) {
        if let Err(e) = self
            .collaborators
            .notifications
            .notify_user(recipient, message, severity)
            .await
        {
            warn!(process_id = %self.process_id, recipient, error = %e, "notification failed");
        }
    }
}

/// One kind of bulk job.
///
/// The engine calls the hooks in this order: [`validate_request`],
/// [`preflight`], [`validate_item`] for every item, [`process_item`] for the
/// accepted items (batched), and [`cleanup`] unless the job was cancelled.
///
/// [`validate_request`]: JobKind::validate_request
/// [`preflight`]: JobKind::preflight
/// [`validate_item`]: JobKind::validate_item
/// [`process_item`]: JobKind::process_item
/// [`cleanup`]: JobKind::cleanup
#[async_trait]
pub trait JobKind: Send + Sync + 'static {
    type Item: Send + Sync + 'static;

    fn process_type(&self) -> ProcessType;

    /// Operation name recorded on entries produced by the engine for this job.
    fn operation_name(&self) -> &'static str;

    /// Operation name recorded on validation errors (duplicates, rejected items).
    fn validation_operation(&self) -> &'static str {
        "ValidateRequest"
    }

    /// Identifier and display name of the entity `item` targets.
    fn item_ref(&self, item: &Self::Item) -> EntityRef;

    /// Whole-request validation. An `Err` rejects the request before a
    /// process is created.
    fn validate_request(&self, items: &[Self::Item]) -> Result<(), String> {
        if items.is_empty() {
            Err("No items were supplied".to_string())
        } else {
            Ok(())
        }
    }

    /// Text stored in the audit log for this job.
    fn describe(&self, item_count: usize) -> String {
        format!("{} of {} item(s)", self.process_type(), item_count)
    }

    /// Job-wide precondition, checked once after the gate admits the job.
    /// The default verifies that the directory is reachable.
    async fn preflight(&self, ctx: &JobContext) -> EngineResult<()> {
        ctx.directory()
            .ping()
            .await
            .map_err(|e| EngineError::Preflight(format!("directory unreachable: {e}")))
    }

    async fn validate_item(&self, _item: &Self::Item, _ctx: &JobContext) -> ItemValidation {
        ItemValidation::Accept
    }

    /// Handle one item. Failures go into the returned outcome.
    async fn process_item(&self, item: &Self::Item, ctx: &JobContext) -> ItemOutcome;

    /// Job-wide work after the last batch (not run for cancelled jobs).
    async fn cleanup(&self, _ctx: &JobContext, _report: &BatchReport) -> ItemOutcome {
        ItemOutcome::default()
    }
}
