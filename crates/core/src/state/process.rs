//! Process state machine implementation.
//!
//! This module provides functions for managing the lifecycle of a [`Process`]:
//! creation, progress counters and the single forward transition from
//! `Running` to a terminal status.
//!
//! Every terminal transition returns `false` (and changes nothing) when the
//! process is already terminal, so a late `complete_process` can never
//! overwrite a `Cancelled` status set by another caller.

use bk_protocol::process_models::{Process, ProcessStatus, ProcessType};
use chrono::Utc;
use uuid::Uuid;

/// Create a new Process with Running status.
///
/// # Arguments
///
/// * `process_type` - The kind of job the process runs
/// * `affected_entity_ids` - Identifiers of every work item, fixed for the process lifetime
/// * `initiated_by` - User id of the caller
///
/// # Returns
///
/// A new Process instance with a unique ID, `total_items` equal to the number
/// of affected entities and zeroed counters.
pub fn create_process(
    process_type: ProcessType,
    affected_entity_ids: Vec<String>,
    initiated_by: impl Into<String>,
) -> Process {
    Process {
        id: Uuid::new_v4(),
        process_type,
        status: ProcessStatus::Running,
        started_at: Utc::now(),
        completed_at: None,
        total_items: affected_entity_ids.len(),
        processed_items: 0,
        failed_items: 0,
        current_operation: "Initializing".to_string(),
        progress_percent: 0,
        affected_entity_ids,
        error_message: None,
        initiated_by: initiated_by.into(),
    }
}

/// Replace the human-readable phase label.
pub fn set_operation(process: &mut Process, label: impl Into<String>) {
    if !process.status.is_terminal() {
        process.current_operation = label.into();
    }
}

/// Add finished items to the counters.
///
/// Counters never decrease and are clamped so that
/// `processed_items + failed_items <= total_items` always holds.
pub fn record_items(process: &mut Process, succeeded: usize, failed: usize) {
    let room = process.remaining_items();
    let succeeded = succeeded.min(room);
    let failed = failed.min(room - succeeded);
    process.processed_items += succeeded;
    process.failed_items += failed;

    if process.total_items > 0 {
        let done = process.processed_items + process.failed_items;
        let percent = (done * 100 / process.total_items).min(100) as u8;
        process.progress_percent = process.progress_percent.max(percent);
    }
}

/// Advance phase-driven progress. Progress never moves backwards.
pub fn set_progress(process: &mut Process, percent: u8) {
    process.progress_percent = process.progress_percent.max(percent.min(100));
}

/// Mark the process as finished after all items were handled.
///
/// `had_errors` selects between `Completed` and `CompletedWithErrors`.
pub fn complete_process(process: &mut Process, had_errors: bool) -> bool {
    let status = if had_errors {
        ProcessStatus::CompletedWithErrors
    } else {
        ProcessStatus::Completed
    };
    if !finish(process, status) {
        return false;
    }
    process.progress_percent = 100;
    process.current_operation = "Completed".to_string();
    true
}

/// Mark the process as failed with an orchestrator-level error.
pub fn fail_process(process: &mut Process, error: impl Into<String>) -> bool {
    if !finish(process, ProcessStatus::Failed) {
        return false;
    }
    process.error_message = Some(error.into());
    process.current_operation = "Failed".to_string();
    true
}

/// Mark the process as cancelled.
pub fn cancel_process(process: &mut Process) -> bool {
    if !finish(process, ProcessStatus::Cancelled) {
        return false;
    }
    process.current_operation = "Cancelled".to_string();
    true
}

fn finish(process: &mut Process, status: ProcessStatus) -> bool {
    if process.status.is_terminal() {
        return false;
    }
    process.status = status;
    process.completed_at = Some(Utc::now());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("item-{i}")).collect()
    }

    #[test]
    fn test_create_process() {
        let process = create_process(ProcessType::Onboarding, ids(3), "admin");
        assert_eq!(process.process_type, ProcessType::Onboarding);
        assert_eq!(process.status, ProcessStatus::Running);
        assert_eq!(process.total_items, 3);
        assert_eq!(process.processed_items, 0);
        assert!(process.completed_at.is_none());
        assert_eq!(process.initiated_by, "admin");
    }

    #[test]
    fn test_record_items_clamps_to_total() {
        let mut process = create_process(ProcessType::TeamArchive, ids(4), "admin");

        record_items(&mut process, 2, 1);
        assert_eq!(process.processed_items, 2);
        assert_eq!(process.failed_items, 1);
        assert_eq!(process.progress_percent, 75);

        record_items(&mut process, 5, 5);
        assert_eq!(process.processed_items + process.failed_items, 4);
        assert_eq!(process.progress_percent, 100);
    }

    #[test]
    fn test_complete_process() {
        let mut process = create_process(ProcessType::Onboarding, ids(1), "admin");

        assert!(complete_process(&mut process, false));
        assert_eq!(process.status, ProcessStatus::Completed);
        assert!(process.completed_at.is_some());
        assert_eq!(process.progress_percent, 100);
    }

    #[test]
    fn test_complete_with_errors() {
        let mut process = create_process(ProcessType::Onboarding, ids(1), "admin");

        assert!(complete_process(&mut process, true));
        assert_eq!(process.status, ProcessStatus::CompletedWithErrors);
    }

    #[test]
    fn test_fail_process() {
        let mut process = create_process(ProcessType::Report, ids(1), "admin");

        assert!(fail_process(&mut process, "directory unreachable"));
        assert_eq!(process.status, ProcessStatus::Failed);
        assert_eq!(process.error_message.as_deref(), Some("directory unreachable"));
        assert!(process.completed_at.is_some());
    }

    #[test]
    fn test_terminal_status_is_final() {
        let mut process = create_process(ProcessType::Offboarding, ids(2), "admin");

        assert!(cancel_process(&mut process));
        let cancelled_at = process.completed_at;

        assert!(!complete_process(&mut process, false));
        assert!(!fail_process(&mut process, "late failure"));
        assert!(!cancel_process(&mut process));

        assert_eq!(process.status, ProcessStatus::Cancelled);
        assert_eq!(process.completed_at, cancelled_at);
        assert!(process.error_message.is_none());
    }

    #[test]
    fn test_set_operation_ignored_after_completion() {
        let mut process = create_process(ProcessType::Report, ids(1), "admin");
        set_operation(&mut process, "Rendering");
        assert_eq!(process.current_operation, "Rendering");

        complete_process(&mut process, false);
        set_operation(&mut process, "Rendering");
        assert_eq!(process.current_operation, "Completed");
    }

    #[test]
    fn test_progress_never_moves_backwards() {
        let mut process = create_process(ProcessType::Report, ids(1), "admin");
        set_progress(&mut process, 40);
        set_progress(&mut process, 10);
        assert_eq!(process.progress_percent, 40);
        set_progress(&mut process, 250);
        assert_eq!(process.progress_percent, 100);
    }
}
