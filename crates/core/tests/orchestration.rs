//! End-to-end scenarios through the public orchestrator surface.
//!
//! Every test wires all orchestrators to one shared process manager over an
//! in-memory sandbox and checks results, process records and the event
//! stream together.

mod common;

use bk_core::config::loader::load_config;
use bk_core::init::{generate_bulk_kit_structure, InitOptions};
use bk_core::jobs::{JobOutput, Orchestrator};
use bk_protocol::config_models::JobSpec;
use bk_protocol::entity_models::TeamState;
use bk_protocol::job_models::{BulkOperationOptions, HealthStatus, SchoolYearTransitionRequest};
use bk_protocol::process_models::ProcessStatus;
use common::*;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_ten_valid_onboarding_plans_complete() {
    let mut h = harness(school_directory());
    let plans = (0..10).map(|n| onboarding_plan(n, MATH)).collect();

    let result = h
        .orchestrators
        .provisioning
        .run_onboarding(plans, options_with_batch(10), admin())
        .await;

    assert_result_consistent(&result);
    assert_eq!(result.status, ProcessStatus::Completed);
    assert_eq!(result.success_count(), 10);
    assert!(result
        .successful_operations
        .iter()
        .all(|s| s.operation == "CreateUser"));

    let process_id = result.process_id.expect("process should be registered");
    let process = h
        .orchestrators
        .manager()
        .get_process(process_id)
        .expect("finished process stays visible");
    assert_process_consistent(&process);
    assert_eq!(process.processed_items, 10);
    assert_eq!(process.failed_items, 0);

    let events = drain(&mut h.events);
    assert_event_sequence(&events, process_id);
    assert_eq!(h.sandbox.directory.snapshot().await.users.len(), 11);
}

#[tokio::test]
async fn test_unknown_department_fails_only_those_plans() {
    let h = harness(school_directory());
    let plans = (0..10)
        .map(|n| {
            let department = if matches!(n, 2 | 5 | 8) { "dep-missing" } else { MATH };
            onboarding_plan(n, department)
        })
        .collect();

    let result = h
        .orchestrators
        .provisioning
        .run_onboarding(plans, options_with_batch(10), admin())
        .await;

    assert_result_consistent(&result);
    assert_eq!(result.status, ProcessStatus::CompletedWithErrors);
    assert_eq!(result.success_count(), 7);
    assert_eq!(result.error_count(), 3);
    assert!(result
        .errors
        .iter()
        .all(|e| e.operation == "ValidateOnboardingPlan"));

    let failed: Vec<&str> = result.errors.iter().map(|e| e.entity_id.as_str()).collect();
    assert_eq!(
        failed,
        vec![
            "user-2@school.example",
            "user-5@school.example",
            "user-8@school.example"
        ]
    );

    let process = h
        .orchestrators
        .manager()
        .get_process(result.process_id.unwrap())
        .unwrap();
    assert_eq!(process.processed_items, 7);
    assert_eq!(process.failed_items, 3);
}

#[tokio::test]
async fn test_already_archived_team_does_not_spoil_success() {
    let h = harness(school_directory());

    let result = h
        .orchestrators
        .lifecycle
        .run_archive(
            vec![
                "team-1a".to_string(),
                "team-old".to_string(),
                "team-1b".to_string(),
            ],
            BulkOperationOptions::default(),
            admin(),
        )
        .await;

    assert_result_consistent(&result);
    assert!(result.is_success());
    assert_eq!(result.status, ProcessStatus::Completed);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].entity_id, "team-old");
    assert!(result.warnings[0].message.contains("already archived"));

    let archived: Vec<&str> = result
        .successful_operations
        .iter()
        .filter(|s| s.operation == "ArchiveTeam")
        .map(|s| s.entity_id.as_str())
        .collect();
    assert_eq!(archived, vec!["team-1a", "team-1b"]);

    let snapshot = h.sandbox.directory.snapshot().await;
    assert!(snapshot.teams.iter().all(|t| t.state == TeamState::Archived));
}

#[tokio::test]
async fn test_stop_on_first_error_keeps_only_first_batch() {
    let h = harness(school_directory());
    h.sandbox
        .directory
        .fail_writes_for("user-0@school.example")
        .await;
    let plans = (0..6).map(|n| onboarding_plan(n, MATH)).collect();
    let options = BulkOperationOptions {
        batch_size: 2,
        continue_on_error: false,
        ..BulkOperationOptions::default()
    };

    let result = h
        .orchestrators
        .provisioning
        .run_onboarding(plans, options, admin())
        .await;

    assert_result_consistent(&result);
    assert_eq!(result.status, ProcessStatus::CompletedWithErrors);
    assert_eq!(result.error_count(), 1);
    assert_eq!(result.errors[0].operation, "CreateUser");
    assert_eq!(result.success_count(), 1);
    assert_eq!(result.successful_operations[0].entity_name, "User 1");

    let process = h
        .orchestrators
        .manager()
        .get_process(result.process_id.unwrap())
        .unwrap();
    assert_process_consistent(&process);
    assert_eq!(process.processed_items + process.failed_items, 2);
}

#[tokio::test]
async fn test_cancel_unknown_process_mutates_nothing() {
    let h = harness(school_directory());

    assert!(!h.orchestrators.manager().cancel_process(Uuid::new_v4()));
    assert!(!h.orchestrators.provisioning.cancel_process(Uuid::new_v4()));
    assert!(h.orchestrators.manager().list_processes().is_empty());
}

#[tokio::test]
async fn test_cancel_is_scoped_to_the_owning_orchestrator() {
    let h = harness(school_directory());
    h.sandbox.directory.set_latency(Duration::from_millis(20));
    let plans = (0..20).map(|n| onboarding_plan(n, MATH)).collect();

    let orchestrators = &h.orchestrators;
    let canceller = async {
        loop {
            if let Some(process) = orchestrators.provisioning.list_active_processes().first() {
                assert!(
                    !orchestrators.lifecycle.cancel_process(process.id),
                    "lifecycle must not cancel an onboarding job"
                );
                assert!(orchestrators.provisioning.cancel_process(process.id));
                return process.id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    let (result, cancelled_id) = tokio::join!(
        orchestrators
            .provisioning
            .run_onboarding(plans, options_with_batch(2), admin()),
        canceller
    );

    assert_eq!(result.process_id, Some(cancelled_id));
    assert_eq!(result.status, ProcessStatus::Cancelled);
    assert!(result.success_count() < 20);

    let process = orchestrators.manager().get_process(cancelled_id).unwrap();
    assert_process_consistent(&process);
    assert_eq!(process.status, ProcessStatus::Cancelled);
    assert!(orchestrators.provisioning.list_active_processes().is_empty());
    assert!(!orchestrators.provisioning.cancel_process(cancelled_id));
}

#[tokio::test]
async fn test_school_year_transition_events() {
    let mut h = harness(school_directory());
    let request = SchoolYearTransitionRequest {
        from_school_year_id: "year-2024".to_string(),
        new_school_year: bk_protocol::entity_models::NewSchoolYear {
            name: "2025/2026".to_string(),
            starts_on: date(2025, 8, 15),
            ends_on: date(2026, 7, 15),
        },
        team_templates: vec![bk_protocol::entity_models::NewTeam {
            name: "Algebra 2A".to_string(),
            school_year_id: None,
            department_id: Some(MATH.to_string()),
            owner_ids: vec!["user-grace".to_string()],
            member_ids: Vec::new(),
        }],
    };

    let result = h
        .orchestrators
        .school_year
        .run_transition(request, BulkOperationOptions::default(), admin())
        .await;

    assert_result_consistent(&result);
    assert_eq!(result.status, ProcessStatus::Completed);

    let events = drain(&mut h.events);
    let started = started_processes(&events);
    assert_eq!(
        started.len(),
        3,
        "the transition and both of its phases register a process"
    );
    assert_eq!(Some(started[0]), result.process_id);
    for id in started {
        assert_event_sequence(&events, id);
    }
    for process in h.orchestrators.manager().list_processes() {
        assert_process_consistent(&process);
        assert_eq!(process.status, ProcessStatus::Completed);
    }

    let snapshot = h.sandbox.directory.snapshot().await;
    let new_year = snapshot
        .school_years
        .iter()
        .find(|y| y.name == "2025/2026")
        .unwrap();
    assert!(new_year.active);
    assert!(snapshot.teams.iter().any(|t| {
        t.name == "Algebra 2A" && t.school_year_id.as_deref() == Some(new_year.id.as_str())
    }));
}

#[tokio::test]
async fn test_health_check_through_dispatch() {
    let h = harness(school_directory());

    let output = h
        .orchestrators
        .run(
            JobSpec::HealthCheck(Vec::new()),
            BulkOperationOptions::default(),
            admin(),
        )
        .await;

    match &output {
        JobOutput::Health(report) => assert_eq!(report.overall, HealthStatus::Healthy),
        other => panic!("Expected a health report, got {other:?}"),
    }
    assert_result_consistent(output.result());
}

#[tokio::test]
async fn test_scaffolded_jobs_run_against_scaffolded_directory() {
    let dir = tempfile::tempdir().unwrap();
    generate_bulk_kit_structure(InitOptions {
        target_dir: dir.path().to_path_buf(),
        force: false,
        minimal: false,
    })
    .await
    .unwrap();
    let config = load_config(dir.path()).await.unwrap();

    for job in &config.jobs {
        let h = harness(config.directory.clone());
        let output = h
            .orchestrators
            .run(job.job.clone(), config.options_for(job), admin())
            .await;
        let result = output.result();

        assert_result_consistent(result);
        assert_eq!(
            result.status,
            ProcessStatus::Completed,
            "job {} should complete cleanly: {result:?}",
            job.name
        );
        for process in h.orchestrators.manager().list_processes() {
            assert_process_consistent(&process);
        }
    }
}
