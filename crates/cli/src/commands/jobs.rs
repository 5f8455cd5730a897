//! `bulk-kit jobs`: list saved job definitions.

use bk_core::config::loader::load_config;
use color_eyre::eyre::WrapErr;
use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;

pub async fn execute(root: &Path) -> color_eyre::Result<ExitCode> {
    let config = load_config(root)
        .await
        .wrap_err("Failed to load .bulk-kit configuration")?;

    if config.jobs.is_empty() {
        println!("No jobs found. Run {} first.", "bulk-kit init".cyan());
        return Ok(ExitCode::SUCCESS);
    }

    let width = config.jobs.iter().map(|j| j.name.len()).max().unwrap_or(0);
    for job in &config.jobs {
        println!(
            "{}  {} {:>4} item(s)  {}",
            format!("{:width$}", job.name).bold(),
            format!("{:<24}", job.job.process_type().label()).cyan(),
            job.job.item_count(),
            job.description.as_deref().unwrap_or("").dimmed(),
        );
    }
    Ok(ExitCode::SUCCESS)
}
