//! Report generation and export.
//!
//! A report is a single-item job. Its progress moves through named phases
//! instead of item counts:
//!
//! 1. Collecting (10%): read the entities from the directory
//! 2. Aggregating (40%): build rows and apply the request filters
//! 3. Rendering (70%): serialize to the requested format
//! 4. Storing (90%): hand the document to the export store
//! 5. Completed (100%)
//!
//! Cancellation is honored between phases.

use crate::collaborators::{CollaboratorResult, Collaborators};
use crate::engine::batch::ItemOutcome;
use crate::engine::gate::ConcurrencyGate;
use crate::engine::job::{JobContext, JobKind};
use crate::engine::JobEngine;
use crate::jobs::{step_error, Orchestrator};
use crate::state::manager::ProcessManager;
use async_trait::async_trait;
use bk_protocol::entity_models::{Department, Team, User};
use bk_protocol::job_models::{
    AuthContext, BulkOperationOptions, ExportFormat, ReportKind, ReportRequest,
};
use bk_protocol::process_models::ProcessType;
use bk_protocol::result_models::{BulkOperationResult, EntityRef, OperationError, OperationSuccess};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

pub struct ReportExporter {
    engine: JobEngine<ReportJob>,
    manager: ProcessManager,
}

impl ReportExporter {
    pub fn new(collaborators: Collaborators, manager: ProcessManager, gate_size: usize) -> Self {
        Self {
            engine: JobEngine::new(
                ReportJob,
                ConcurrencyGate::new(gate_size),
                manager.clone(),
                collaborators,
            ),
            manager,
        }
    }

    /// Generate and store one report.
    ///
    /// On success the single `ExportReport` entry carries the export location
    /// and row count in its `details`.
    pub async fn run_report(
        &self,
        request: ReportRequest,
        options: BulkOperationOptions,
        auth: AuthContext,
    ) -> BulkOperationResult {
        self.engine.run(vec![request], options, auth).await
    }
}

impl Orchestrator for ReportExporter {
    fn process_types(&self) -> &'static [ProcessType] {
        &[ProcessType::Report]
    }

    fn manager(&self) -> &ProcessManager {
        &self.manager
    }
}

/// Document written to the export store.
#[derive(Serialize, Debug)]
struct ReportDocument {
    report: String,
    kind: ReportKind,
    generated_at: String,
    row_count: usize,
    filters: BTreeMap<String, String>,
    rows: Vec<Value>,
}

/// Raw directory data a report is built from.
#[derive(Default)]
struct Collected {
    users: Vec<User>,
    teams: Vec<Team>,
    departments: Vec<Department>,
}

pub struct ReportJob;

impl ReportJob {
    async fn collect(&self, kind: ReportKind, ctx: &JobContext) -> CollaboratorResult<Collected> {
        let directory = ctx.directory();
        let collected = match kind {
            ReportKind::UserDirectory => Collected {
                users: directory.list_users().await?,
                ..Collected::default()
            },
            ReportKind::TeamOverview => Collected {
                teams: directory.list_teams().await?,
                ..Collected::default()
            },
            ReportKind::DepartmentSummary => Collected {
                users: directory.list_users().await?,
                teams: directory.list_teams().await?,
                departments: directory.list_departments().await?,
            },
        };
        Ok(collected)
    }
}

fn report_ref(request: &ReportRequest) -> EntityRef {
    EntityRef::new(request.name.clone(), request.name.clone())
}

fn build_rows(kind: ReportKind, collected: &Collected) -> Vec<Value> {
    match kind {
        ReportKind::UserDirectory => collected
            .users
            .iter()
            .map(|u| {
                json!({
                    "id": u.id,
                    "display_name": u.display_name,
                    "user_principal_name": u.user_principal_name,
                    "department_id": u.department_id,
                    "role": u.role,
                    "active": u.active,
                })
            })
            .collect(),
        ReportKind::TeamOverview => collected
            .teams
            .iter()
            .map(|t| {
                json!({
                    "id": t.id,
                    "name": t.name,
                    "state": t.state,
                    "school_year_id": t.school_year_id,
                    "department_id": t.department_id,
                    "owner_count": t.owner_ids.len(),
                    "member_count": t.all_member_ids().len(),
                })
            })
            .collect(),
        ReportKind::DepartmentSummary => collected
            .departments
            .iter()
            .map(|d| {
                let in_department = |id: &Option<String>| id.as_deref() == Some(d.id.as_str());
                let users: Vec<&User> = collected
                    .users
                    .iter()
                    .filter(|u| in_department(&u.department_id))
                    .collect();
                json!({
                    "id": d.id,
                    "name": d.name,
                    "user_count": users.len(),
                    "active_user_count": users.iter().filter(|u| u.active).count(),
                    "team_count": collected
                        .teams
                        .iter()
                        .filter(|t| in_department(&t.department_id))
                        .count(),
                })
            })
            .collect(),
    }
}

/// Keep rows whose fields equal every filter value.
///
/// Non-string fields compare by their JSON text (`true`, `3`).
fn apply_filters(rows: Vec<Value>, filters: &BTreeMap<String, String>) -> Vec<Value> {
    if filters.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| {
            filters.iter().all(|(field, expected)| match row.get(field) {
                Some(Value::String(actual)) => actual == expected,
                Some(Value::Null) | None => false,
                Some(other) => other.to_string() == *expected,
            })
        })
        .collect()
}

fn render(document: &ReportDocument, format: ExportFormat) -> Result<Vec<u8>, String> {
    match format {
        ExportFormat::Json => serde_json::to_vec_pretty(document).map_err(|e| e.to_string()),
        ExportFormat::Yaml => serde_yaml::to_string(document)
            .map(String::into_bytes)
            .map_err(|e| e.to_string()),
    }
}

#[async_trait]
impl JobKind for ReportJob {
    type Item = ReportRequest;

    fn process_type(&self) -> ProcessType {
        ProcessType::Report
    }

    fn operation_name(&self) -> &'static str {
        "ExportReport"
    }

    fn item_ref(&self, request: &ReportRequest) -> EntityRef {
        report_ref(request)
    }

    fn validate_request(&self, items: &[ReportRequest]) -> Result<(), String> {
        match items {
            [] => Err("No report was requested".to_string()),
            [request] if request.name.trim().is_empty() => {
                Err("Report name must not be empty".to_string())
            }
            [_] => Ok(()),
            _ => Err("Only one report can be generated per job".to_string()),
        }
    }

    fn describe(&self, _item_count: usize) -> String {
        "Report export".to_string()
    }

    async fn process_item(&self, request: &ReportRequest, ctx: &JobContext) -> ItemOutcome {
        let entity = report_ref(request);

        ctx.report_phase("Collecting", 10).await;
        let collected = match self.collect(request.kind, ctx).await {
            Ok(collected) => collected,
            Err(e) => {
                return ItemOutcome::failure(step_error(
                    "CollectReportData",
                    &entity,
                    "Failed to read report data",
                    e,
                ))
            }
        };
        if ctx.is_cancelled() {
            return ItemOutcome::default();
        }

        ctx.report_phase("Aggregating", 40).await;
        let rows = apply_filters(build_rows(request.kind, &collected), &request.filters);
        debug!(report = %request.name, rows = rows.len(), "report rows built");
        if ctx.is_cancelled() {
            return ItemOutcome::default();
        }

        ctx.report_phase("Rendering", 70).await;
        let document = ReportDocument {
            report: request.name.clone(),
            kind: request.kind,
            generated_at: Utc::now().to_rfc3339(),
            row_count: rows.len(),
            filters: request.filters.clone(),
            rows,
        };
        let content = match render(&document, request.format) {
            Ok(content) => content,
            Err(e) => {
                return ItemOutcome::failure(
                    OperationError::new("RenderReport", &entity, "Failed to render report")
                        .with_cause(e),
                )
            }
        };
        if ctx.is_cancelled() {
            return ItemOutcome::default();
        }

        if ctx.is_dry_run() {
            ctx.report_phase("Completed", 100).await;
            return ItemOutcome::success(
                OperationSuccess::new(
                    "ExportReport",
                    &entity,
                    format!("Would export {} row(s)", document.row_count),
                )
                .with_details(json!({ "row_count": document.row_count, "bytes": content.len() })),
            );
        }

        ctx.report_phase("Storing", 90).await;
        let location = match ctx
            .collaborators
            .exports
            .store(&request.name, request.format, content)
            .await
        {
            Ok(location) => location,
            Err(e) => {
                return ItemOutcome::failure(step_error(
                    "StoreReport",
                    &entity,
                    "Failed to store report",
                    e,
                ))
            }
        };

        ctx.report_phase("Completed", 100).await;
        ItemOutcome::success(
            OperationSuccess::new(
                "ExportReport",
                &entity,
                format!("Exported {} row(s) to {location}", document.row_count),
            )
            .with_details(json!({ "location": location, "row_count": document.row_count })),
        )
    }
}
