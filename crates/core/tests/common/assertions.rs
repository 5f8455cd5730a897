//! Custom assertion helpers for integration tests.

use bk_protocol::ipc::Event;
use bk_protocol::process_models::Process;
use bk_protocol::result_models::BulkOperationResult;
use uuid::Uuid;

/// `success` mirrors the error list, and every error names its operation.
pub fn assert_result_consistent(result: &BulkOperationResult) {
    assert_eq!(
        result.success,
        result.errors.is_empty(),
        "success flag must be true iff there are no errors: {result:?}"
    );
    for error in &result.errors {
        assert!(!error.operation.is_empty(), "error without operation: {error:?}");
    }
}

/// Counter and completion invariants of a process record.
pub fn assert_process_consistent(process: &Process) {
    assert!(
        process.processed_items + process.failed_items <= process.total_items,
        "counters exceed total: {process:?}"
    );
    assert_eq!(
        process.completed_at.is_some(),
        process.status.is_terminal(),
        "completed_at must be set iff the status is terminal: {process:?}"
    );
}

/// Events of one process: started first, finished last, progress never backwards.
pub fn assert_event_sequence(events: &[Event], process_id: Uuid) {
    let own: Vec<&Event> = events
        .iter()
        .filter(|e| event_process_id(e) == Some(process_id))
        .collect();
    assert!(!own.is_empty(), "no events for process {process_id}");

    assert!(
        matches!(own[0], Event::ProcessStarted { .. }),
        "First event should be ProcessStarted, got: {:?}",
        own[0]
    );
    assert!(
        matches!(own[own.len() - 1], Event::ProcessFinished { .. }),
        "Last event should be ProcessFinished, got: {:?}",
        own[own.len() - 1]
    );

    let percents: Vec<u8> = own
        .iter()
        .filter_map(|e| match e {
            Event::ProcessProgress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert!(
        percents.windows(2).all(|w| w[0] <= w[1]),
        "progress moved backwards: {percents:?}"
    );
}

pub fn event_process_id(event: &Event) -> Option<Uuid> {
    match event {
        Event::ProcessStarted { process_id, .. }
        | Event::ProcessProgress { process_id, .. }
        | Event::ProcessFinished { process_id, .. } => Some(*process_id),
        Event::Notification { .. } => None,
    }
}

/// Process ids of every `ProcessStarted` event, in order.
pub fn started_processes(events: &[Event]) -> Vec<Uuid> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::ProcessStarted { process_id, .. } => Some(*process_id),
            _ => None,
        })
        .collect()
}
