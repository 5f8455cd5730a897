//! Entry point of the `bulk-kit` binary.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Run bulk directory jobs against a sandbox snapshot.
#[derive(Debug, Parser)]
#[command(name = "bulk-kit", author, version, about, long_about = None)]
struct Cli {
    /// Project root containing the `.bulk-kit/` directory.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scaffold a `.bulk-kit/` directory from the built-in templates.
    Init(commands::init::InitArgs),
    /// List the saved job definitions.
    Jobs,
    /// Run a saved job against the sandbox directory.
    Run(commands::run::RunArgs),
}

#[tokio::main]
async fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => commands::init::execute(args, &cli.root).await,
        Commands::Jobs => commands::jobs::execute(&cli.root).await,
        Commands::Run(args) => commands::run::execute(args, &cli.root).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::parse_from([
            "bulk-kit",
            "--root",
            "/tmp/x",
            "run",
            "archive-teams",
            "--json",
        ]);
        assert_eq!(cli.root, PathBuf::from("/tmp/x"));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.job, "archive-teams");
                assert!(args.json);
                assert!(!args.dry_run);
            }
            other => panic!("Expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_init_flags() {
        let cli = Cli::parse_from(["bulk-kit", "init", "--force", "--minimal"]);
        match cli.command {
            Commands::Init(args) => assert!(args.force && args.minimal),
            other => panic!("Expected init, got {other:?}"),
        }
    }
}
