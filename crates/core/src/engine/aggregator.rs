//! Collects per-item outcomes into the final [`BulkOperationResult`].

use crate::engine::batch::{BatchReport, ItemOutcome};
use bk_protocol::process_models::{ProcessStatus, ProcessType};
use bk_protocol::result_models::{BulkOperationResult, OperationError, OperationSuccess};
use chrono::Utc;
use uuid::Uuid;

/// Accumulates successes, errors and warnings while a job runs.
///
/// The aggregator never decides the status itself; the engine passes it to
/// [`ResultAggregator::build`] once the job is over.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    operation_type: ProcessType,
    process_id: Option<Uuid>,
    successes: Vec<OperationSuccess>,
    errors: Vec<OperationError>,
    warnings: Vec<OperationError>,
}

impl ResultAggregator {
    pub fn new(operation_type: ProcessType, process_id: Option<Uuid>) -> Self {
        Self {
            operation_type,
            process_id,
            successes: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_success(&mut self, success: OperationSuccess) {
        self.successes.push(success);
    }

    pub fn add_error(&mut self, error: OperationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: OperationError) {
        self.warnings.push(warning);
    }

    pub fn add_outcome(&mut self, outcome: ItemOutcome) {
        self.successes.extend(outcome.successes);
        self.errors.extend(outcome.errors);
    }

    pub fn add_batch_report(&mut self, report: BatchReport) {
        self.successes.extend(report.successes);
        self.errors.extend(report.errors);
    }

    /// Take over the entries of a finished sub-job, keeping their order.
    ///
    /// The sub-job's status and process id are dropped; the owner of this
    /// aggregator settles its own status.
    pub fn add_result(&mut self, result: BulkOperationResult) {
        self.successes.extend(result.successful_operations);
        self.errors.extend(result.errors);
        self.warnings.extend(result.warnings);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn build(self, status: ProcessStatus) -> BulkOperationResult {
        BulkOperationResult {
            process_id: self.process_id,
            operation_type: self.operation_type,
            status,
            success: self.errors.is_empty(),
            successful_operations: self.successes,
            errors: self.errors,
            warnings: self.warnings,
            processed_at: Utc::now(),
        }
    }

    /// Result for a request rejected before any process was created.
    pub fn rejected(operation_type: ProcessType, error: OperationError) -> BulkOperationResult {
        let mut aggregator = Self::new(operation_type, None);
        aggregator.add_error(error);
        aggregator.build(ProcessStatus::Failed)
    }
}

/// Terminal status of a job that ran to the end of its pipeline.
///
/// A fired token wins over everything; otherwise any recorded error turns
/// `Completed` into `CompletedWithErrors`.
pub fn resolve_status(cancelled: bool, has_errors: bool) -> ProcessStatus {
    if cancelled {
        ProcessStatus::Cancelled
    } else if has_errors {
        ProcessStatus::CompletedWithErrors
    } else {
        ProcessStatus::Completed
    }
}

/// One-line human summary, used for the completion notification and audit entry.
pub fn summary(result: &BulkOperationResult) -> String {
    let mut text = format!(
        "{} {}: {} succeeded, {} failed",
        result.operation_type,
        status_word(result.status),
        result.success_count(),
        result.error_count()
    );
    if !result.warnings.is_empty() {
        text.push_str(&format!(", {} skipped", result.warnings.len()));
    }
    text
}

fn status_word(status: ProcessStatus) -> &'static str {
    match status {
        ProcessStatus::Running => "running",
        ProcessStatus::Completed => "completed",
        ProcessStatus::CompletedWithErrors => "completed with errors",
        ProcessStatus::Failed => "failed",
        ProcessStatus::Cancelled => "cancelled",
    }
}
