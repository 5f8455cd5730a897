//! `bulk-kit init`: scaffold a project.

use bk_core::init::{generate_bulk_kit_structure, InitOptions};
use clap::Args;
use color_eyre::eyre::WrapErr;
use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Overwrite an existing `.bulk-kit/` directory.
    #[arg(long)]
    pub force: bool,

    /// Only write the configuration, the directory snapshot and one job.
    #[arg(long)]
    pub minimal: bool,
}

pub async fn execute(args: InitArgs, root: &Path) -> color_eyre::Result<ExitCode> {
    let written = generate_bulk_kit_structure(InitOptions {
        target_dir: root.to_path_buf(),
        force: args.force,
        minimal: args.minimal,
    })
    .await
    .wrap_err("Failed to initialize project")?;

    println!("{} bulk-kit project", "Initialized".green().bold());
    for path in written {
        let shown = path.strip_prefix(root).unwrap_or(&path);
        println!("  {}", shown.display());
    }
    println!();
    println!("Next: {} to see the example jobs", "bulk-kit jobs".cyan());
    Ok(ExitCode::SUCCESS)
}
