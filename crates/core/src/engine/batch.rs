//! Batch runner.
//!
//! Splits the accepted work items into fixed-size batches and walks them in
//! order. Items inside a batch run one after another to keep the load on the
//! remote directory predictable. Between batches the runner reports progress
//! and decides whether to continue: cancellation, `continue_on_error = false`
//! with an error, or an error rate above the acceptable percentage all stop
//! further batches and return the partial results.

use bk_protocol::job_models::BulkOperationOptions;
use bk_protocol::result_models::{OperationError, OperationSuccess};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Everything that happened while handling one work item.
///
/// An item counts as failed when it produced at least one error, even if
/// some of its steps succeeded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemOutcome {
    pub successes: Vec<OperationSuccess>,
    pub errors: Vec<OperationError>,
}

impl ItemOutcome {
    pub fn success(success: OperationSuccess) -> Self {
        Self {
            successes: vec![success],
            errors: Vec::new(),
        }
    }

    pub fn failure(error: OperationError) -> Self {
        Self {
            successes: Vec::new(),
            errors: vec![error],
        }
    }

    pub fn push_success(&mut self, success: OperationSuccess) {
        self.successes.push(success);
    }

    pub fn push_error(&mut self, error: OperationError) {
        self.errors.push(error);
    }

    pub fn is_failure(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Why the runner stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every item was attempted.
    Exhausted,
    Cancelled,
    /// `continue_on_error` is off and an item failed.
    ErrorAbort,
    /// The running error rate went above the acceptable percentage.
    ErrorThreshold,
}

/// Snapshot handed to the progress callback after each batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    /// 1-based index of the batch that just finished.
    pub batch_index: usize,
    pub batch_count: usize,
    pub total_items: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub batch_succeeded: usize,
    pub batch_failed: usize,
}

impl BatchProgress {
    pub fn percent(&self) -> u8 {
        if self.total_items == 0 {
            return 100;
        }
        (self.attempted * 100 / self.total_items).min(100) as u8
    }
}

/// Aggregated output of a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub successes: Vec<OperationSuccess>,
    pub errors: Vec<OperationError>,
    pub attempted: usize,
    pub succeeded_items: usize,
    pub failed_items: usize,
    pub stop_reason: StopReason,
}

impl BatchReport {
    /// Failed items as a percentage of attempted items.
    pub fn error_rate(&self) -> f64 {
        error_rate(self.failed_items, self.attempted)
    }
}

fn error_rate(failed: usize, attempted: usize) -> f64 {
    if attempted == 0 {
        0.0
    } else {
        failed as f64 * 100.0 / attempted as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchRunner {
    batch_size: usize,
    continue_on_error: bool,
    acceptable_error_percentage: f64,
}

impl BatchRunner {
    pub fn new(
        batch_size: usize,
        continue_on_error: bool,
        acceptable_error_percentage: f64,
    ) -> Self {
        Self {
            batch_size: batch_size.max(1),
            continue_on_error,
            acceptable_error_percentage,
        }
    }

    pub fn from_options(options: &BulkOperationOptions) -> Self {
        Self::new(
            options.batch_size,
            options.continue_on_error,
            options.acceptable_error_percentage,
        )
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run `action` over `items` batch by batch.
    ///
    /// # Arguments
    ///
    /// * `items` - Work items, attempted in input order
    /// * `token` - Checked before every item and after every batch
    /// * `action` - Handles one item; failures are reported in the outcome, never returned
    /// * `on_batch` - Awaited after each batch (also after a batch cut short by cancellation)
    pub async fn run<'a, T, F, Fut, P, PFut>(
        &self,
        items: &'a [T],
        token: &CancellationToken,
        mut action: F,
        mut on_batch: P,
    ) -> BatchReport
    where
        F: FnMut(&'a T) -> Fut,
        Fut: Future<Output = ItemOutcome>,
        P: FnMut(BatchProgress) -> PFut,
        PFut: Future<Output = ()>,
    {
        let batch_count = items.len().div_ceil(self.batch_size);
        let mut report = BatchReport {
            successes: Vec::new(),
            errors: Vec::new(),
            attempted: 0,
            succeeded_items: 0,
            failed_items: 0,
            stop_reason: StopReason::Exhausted,
        };

        for (index, batch) in items.chunks(self.batch_size).enumerate() {
            let batch_index = index + 1;
            if token.is_cancelled() {
                report.stop_reason = StopReason::Cancelled;
                break;
            }

            debug!(batch = batch_index, batch_count, size = batch.len(), "starting batch");
            let mut batch_succeeded = 0;
            let mut batch_failed = 0;
            let mut cut_short = false;

            for item in batch {
                if token.is_cancelled() {
                    cut_short = true;
                    break;
                }
                let outcome = action(item).await;
                report.attempted += 1;
                if outcome.is_failure() {
                    batch_failed += 1;
                } else {
                    batch_succeeded += 1;
                }
                report.successes.extend(outcome.successes);
                report.errors.extend(outcome.errors);
            }

            report.succeeded_items += batch_succeeded;
            report.failed_items += batch_failed;

            if batch_succeeded + batch_failed > 0 {
                on_batch(BatchProgress {
                    batch_index,
                    batch_count,
                    total_items: items.len(),
                    attempted: report.attempted,
                    succeeded: report.succeeded_items,
                    failed: report.failed_items,
                    batch_succeeded,
                    batch_failed,
                })
                .await;
            }

            if cut_short || token.is_cancelled() {
                report.stop_reason = StopReason::Cancelled;
                break;
            }

            let more_batches = batch_index < batch_count;
            if !more_batches {
                break;
            }
            if report.failed_items > 0 && !self.continue_on_error {
                info!(
                    batch = batch_index,
                    "stopping after failed item (continue_on_error = false)"
                );
                report.stop_reason = StopReason::ErrorAbort;
                break;
            }
            let rate = report.error_rate();
            if rate > self.acceptable_error_percentage {
                info!(
                    batch = batch_index,
                    error_rate = rate,
                    threshold = self.acceptable_error_percentage,
                    "stopping: error rate above threshold"
                );
                report.stop_reason = StopReason::ErrorThreshold;
                break;
            }
        }

        report
    }
}
