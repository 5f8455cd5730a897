//! Test fixtures for building directories, work items and orchestrators.

use bk_core::collaborators::{DirectorySnapshot, Sandbox};
use bk_core::jobs::Orchestrators;
use bk_core::state::manager::ProcessManager;
use bk_protocol::config_models::GlobalConfig;
use bk_protocol::entity_models::{
    Department, NewUser, SchoolYear, Team, TeamState, User, UserRole,
};
use bk_protocol::ipc::Event;
use bk_protocol::job_models::{AuthContext, BulkOperationOptions, OnboardingPlan};
use chrono::NaiveDate;
use tokio::sync::mpsc;

pub const MATH: &str = "dep-math";

/// A small school: one department, one teacher, one active year and
/// three teams (one of them already archived).
pub fn school_directory() -> DirectorySnapshot {
    DirectorySnapshot {
        departments: vec![Department {
            id: MATH.to_string(),
            name: "Mathematics".to_string(),
        }],
        users: vec![User {
            id: "user-grace".to_string(),
            display_name: "Grace Hopper".to_string(),
            user_principal_name: "grace@school.example".to_string(),
            department_id: Some(MATH.to_string()),
            role: UserRole::Teacher,
            active: true,
            subject_ids: Vec::new(),
        }],
        teams: vec![
            team("team-1a", TeamState::Active),
            team("team-1b", TeamState::Active),
            team("team-old", TeamState::Archived),
        ],
        school_years: vec![SchoolYear {
            id: "year-2024".to_string(),
            name: "2024/2025".to_string(),
            starts_on: date(2024, 8, 15),
            ends_on: date(2025, 7, 15),
            active: true,
        }],
        subjects: Vec::new(),
    }
}

pub fn team(id: &str, state: TeamState) -> Team {
    Team {
        id: id.to_string(),
        name: id.to_uppercase(),
        state,
        school_year_id: Some("year-2024".to_string()),
        department_id: Some(MATH.to_string()),
        owner_ids: vec!["user-grace".to_string()],
        member_ids: Vec::new(),
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

/// Onboarding plan for `user-<n>@school.example` without teams or subjects.
pub fn onboarding_plan(n: usize, department_id: &str) -> OnboardingPlan {
    OnboardingPlan {
        user: NewUser {
            display_name: format!("User {n}"),
            user_principal_name: format!("user-{n}@school.example"),
            department_id: department_id.to_string(),
            role: UserRole::Student,
        },
        team_ids: Vec::new(),
        subject_ids: Vec::new(),
    }
}

pub fn options_with_batch(batch_size: usize) -> BulkOperationOptions {
    BulkOperationOptions {
        batch_size,
        ..BulkOperationOptions::default()
    }
}

pub fn admin() -> AuthContext {
    AuthContext::new("user-admin", "School Admin")
}

/// Orchestrators over a fresh sandbox, plus the receiving end of the event stream.
pub struct Harness {
    pub sandbox: Sandbox,
    pub orchestrators: Orchestrators,
    pub events: mpsc::Receiver<Event>,
}

pub fn harness(snapshot: DirectorySnapshot) -> Harness {
    let sandbox = Sandbox::from_snapshot(snapshot);
    let (events_tx, events) = mpsc::channel(4096);
    let manager = ProcessManager::default().with_events(events_tx);
    let orchestrators =
        Orchestrators::new(sandbox.collaborators(), manager, &GlobalConfig::default());
    Harness {
        sandbox,
        orchestrators,
        events,
    }
}

/// Everything currently queued on the event stream.
pub fn drain(events: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
