//! `bulk-kit run`: execute a saved job against the sandbox directory.
//!
//! The sandbox is an in-memory directory seeded from `directory.yaml`, so a
//! run never touches a real tenant. Progress events are printed to stderr
//! while the job runs; the outcome goes to stdout.

use bk_core::collaborators::Sandbox;
use bk_core::config::loader::load_config;
use bk_core::engine::aggregator::summary;
use bk_core::jobs::{JobOutput, Orchestrators};
use bk_core::state::manager::ProcessManager;
use bk_protocol::ipc::Event;
use bk_protocol::job_models::{AuthContext, HealthReport, HealthStatus};
use bk_protocol::process_models::ProcessStatus;
use bk_protocol::result_models::BulkOperationResult;
use clap::Args;
use color_eyre::eyre::{bail, WrapErr};
use colored::{ColoredString, Colorize};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Name of the job in `.bulk-kit/jobs/`.
    pub job: String,

    /// Print the result as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,

    /// Simulate the job without changing the sandbox.
    #[arg(long)]
    pub dry_run: bool,

    /// User recorded as the initiator of the job.
    #[arg(long, default_value = "cli")]
    pub initiator: String,
}

pub async fn execute(args: RunArgs, root: &Path) -> color_eyre::Result<ExitCode> {
    let config = load_config(root)
        .await
        .wrap_err("Failed to load .bulk-kit configuration")?;
    let Some(job) = config.find_job(&args.job) else {
        let known: Vec<&str> = config.jobs.iter().map(|j| j.name.as_str()).collect();
        bail!(
            "Unknown job '{}'. Available jobs: {}",
            args.job,
            if known.is_empty() {
                "none".to_string()
            } else {
                known.join(", ")
            }
        );
    };

    let mut options = config.options_for(job);
    options.dry_run |= args.dry_run;
    debug!(job = %job.name, ?options, "starting job");

    let sandbox = Sandbox::from_snapshot(config.directory.clone());
    let (events_tx, events_rx) = mpsc::channel(1024);
    let manager = ProcessManager::new(Duration::from_secs(config.global.retention_secs))
        .with_events(events_tx);
    let orchestrators = Orchestrators::new(sandbox.collaborators(), manager, &config.global);

    let printer = tokio::spawn(print_events(events_rx, !args.json));
    let auth = AuthContext::new(args.initiator.clone(), args.initiator.clone());
    let output = orchestrators.run(job.job.clone(), options, auth).await;
    // Dropping the orchestrators closes the event channel and ends the printer.
    drop(orchestrators);
    if let Err(e) = printer.await {
        debug!(error = %e, "event printer stopped");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_output(&output);
    }

    let status = output.result().status;
    Ok(match status {
        ProcessStatus::Completed => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

async fn print_events(mut events: mpsc::Receiver<Event>, show: bool) {
    while let Some(event) = events.recv().await {
        if !show {
            continue;
        }
        match event {
            Event::ProcessStarted {
                process_type,
                total_items,
                ..
            } => eprintln!("{} {process_type} ({total_items} item(s))", "started".cyan()),
            Event::ProcessProgress { percent, label, .. } => {
                eprintln!("  {:>3}% {}", percent, label.dimmed())
            }
            Event::ProcessFinished { status, .. } => {
                eprintln!("{} {}", "finished".cyan(), colored_status(status))
            }
            Event::Notification { .. } => {}
        }
    }
}

fn colored_status(status: ProcessStatus) -> ColoredString {
    match status {
        ProcessStatus::Running => "RUNNING".blue(),
        ProcessStatus::Completed => "COMPLETED".green().bold(),
        ProcessStatus::CompletedWithErrors => "COMPLETED WITH ERRORS".yellow().bold(),
        ProcessStatus::Failed => "FAILED".red().bold(),
        ProcessStatus::Cancelled => "CANCELLED".dimmed(),
    }
}

fn print_output(output: &JobOutput) {
    match output {
        JobOutput::Bulk(result) => print_result(result),
        JobOutput::Health(report) => {
            print_result(&report.result);
            print_health(report);
        }
    }
}

fn print_result(result: &BulkOperationResult) {
    println!();
    println!("{}  {}", colored_status(result.status), summary(result));
    for success in &result.successful_operations {
        println!(
            "  {} {:<20} {}: {}",
            "ok".green(),
            success.operation,
            success.entity_name,
            success.message
        );
    }
    for warning in &result.warnings {
        println!(
            "  {} {:<20} {}: {}",
            "skip".yellow(),
            warning.operation,
            warning.entity_name,
            warning.message
        );
    }
    for error in &result.errors {
        let cause = error
            .cause
            .as_deref()
            .map(|c| format!(" ({c})"))
            .unwrap_or_default();
        println!(
            "  {} {:<20} {}: {}{}",
            "err".red(),
            error.operation,
            error.entity_name,
            error.message,
            cause.dimmed()
        );
    }
}

fn print_health(report: &HealthReport) {
    println!();
    println!("Overall: {}", health_label(report.overall));
    for component in &report.components {
        println!(
            "  {} {:<22} {:>6} ms  {}",
            health_label(component.status),
            component.component.label(),
            component.duration_ms,
            component.message
        );
    }
    if !report.recommendations.is_empty() {
        println!();
        println!("Recommendations:");
        for recommendation in &report.recommendations {
            println!("  - {recommendation}");
        }
    }
}

fn health_label(status: HealthStatus) -> ColoredString {
    match status {
        HealthStatus::Healthy => format!("{:<9}", "HEALTHY").green(),
        HealthStatus::Degraded => format!("{:<9}", "DEGRADED").yellow(),
        HealthStatus::Unhealthy => format!("{:<9}", "UNHEALTHY").red(),
    }
}
