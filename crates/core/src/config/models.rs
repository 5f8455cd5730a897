//! Configuration models that aggregate all settings.
//!
//! This module provides the unified `AppConfig` structure that combines
//! global settings, the sandbox directory snapshot and the saved job
//! definitions into a single configuration object.

use crate::collaborators::DirectorySnapshot;
use bk_protocol::config_models::{GlobalConfig, JobDefinition};
use bk_protocol::job_models::BulkOperationOptions;

/// Unified application configuration loaded from `.bulk-kit/` directory.
///
/// This structure aggregates all configuration sources:
/// - `config.toml`: Global settings
/// - `directory.yaml`: Entities seeding the sandbox directory
/// - `jobs/*.yaml`: Saved job definitions
///
/// # Example
///
/// ```rust,no_run
/// use bk_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Loaded {} users and {} jobs",
///          config.directory.users.len(),
///          config.jobs.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Global settings from `config.toml`.
    pub global: GlobalConfig,

    /// Sandbox entities from `directory.yaml`.
    pub directory: DirectorySnapshot,

    /// All job definitions loaded from `jobs/*.yaml`, sorted by name.
    pub jobs: Vec<JobDefinition>,
}

impl AppConfig {
    pub fn find_job(&self, name: &str) -> Option<&JobDefinition> {
        self.jobs.iter().find(|job| job.name == name)
    }

    /// Options a job runs with: its own, or the global defaults.
    pub fn options_for(&self, job: &JobDefinition) -> BulkOperationOptions {
        job.options
            .clone()
            .unwrap_or_else(|| self.global.defaults.clone())
    }
}
