//! Configuration file loader for `.bulk-kit/` directory structure.
//!
//! This module provides functionality to load and parse all configuration files
//! from the `.bulk-kit/` directory, including:
//! - `config.toml`: Global settings
//! - `directory.yaml`: Sandbox directory snapshot
//! - `jobs/*.yaml`: Job definitions

use crate::collaborators::DirectorySnapshot;
use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use crate::config::models::AppConfig;
use bk_protocol::config_models::{GlobalConfig, JobDefinition};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Name of the project directory holding all configuration.
pub const CONFIG_DIR: &str = ".bulk-kit";

/// Loads all configuration from the `.bulk-kit/` directory.
///
/// This function scans the `.bulk-kit/` directory and loads:
/// - Global configuration from `config.toml`
/// - The sandbox directory snapshot from `directory.yaml`
/// - Job definitions from `jobs/*.yaml` files
///
/// # Arguments
///
/// * `root` - Root directory containing the `.bulk-kit/` folder
///
/// # Returns
///
/// An `AppConfig` containing all loaded configuration. If directories or files
/// are missing (but the root exists), returns an empty/default configuration
/// rather than an error.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - Files exist but cannot be read
/// - Files have invalid syntax (TOML or YAML)
/// - Two job files share the same name
/// - A gate in `config.toml` has size zero
///
/// # Example
///
/// ```rust,no_run
/// use bk_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Loaded {} jobs", config.jobs.len());
/// # Ok(())
/// # }
/// ```
pub async fn load_config(root: &Path) -> ConfigResult<AppConfig> {
    let bk_dir = root.join(CONFIG_DIR);

    if !bk_dir.exists() {
        return Ok(AppConfig::default());
    }

    let global = load_global_config(&bk_dir)?;
    let directory = load_directory(&bk_dir)?;
    let jobs = load_jobs(&bk_dir)?;
    debug!(
        users = directory.users.len(),
        teams = directory.teams.len(),
        jobs = jobs.len(),
        "configuration loaded"
    );

    Ok(AppConfig {
        global,
        directory,
        jobs,
    })
}

/// Loads global configuration from `config.toml`.
fn load_global_config(bk_dir: &Path) -> ConfigResult<GlobalConfig> {
    let config_path = bk_dir.join("config.toml");

    if !config_path.exists() {
        return Ok(GlobalConfig::default());
    }

    let content =
        std::fs::read_to_string(&config_path).map_err(|source| ConfigError::FileRead {
            path: config_path.clone(),
            source,
        })?;

    let config: GlobalConfig =
        toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
            path: config_path.clone(),
            source,
        })?;

    let gates = &config.gates;
    let sizes = [
        ("onboarding", gates.onboarding),
        ("lifecycle", gates.lifecycle),
        ("school_year", gates.school_year),
        ("health", gates.health),
        ("reporting", gates.reporting),
    ];
    if let Some((name, _)) = sizes.iter().find(|(_, size)| *size == 0) {
        return Err(ConfigError::InvalidConfig {
            path: config_path,
            reason: format!("gate '{name}' must allow at least one job"),
        });
    }

    Ok(config)
}

/// Loads the sandbox snapshot from `directory.yaml`.
fn load_directory(bk_dir: &Path) -> ConfigResult<DirectorySnapshot> {
    let path = bk_dir.join("directory.yaml");
    if !path.exists() {
        return Ok(DirectorySnapshot::default());
    }
    read_yaml(&path)
}

/// Loads all job definitions from `jobs/*.yaml`.
fn load_jobs(bk_dir: &Path) -> ConfigResult<Vec<JobDefinition>> {
    let jobs_dir = bk_dir.join("jobs");

    if !jobs_dir.exists() {
        return Ok(Vec::new());
    }

    let mut jobs: Vec<JobDefinition> = Vec::new();
    let mut names = HashSet::new();

    for entry in WalkDir::new(&jobs_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| ConfigError::DirectoryWalk {
            path: jobs_dir.clone(),
            source,
        })?;

        let path = entry.path();

        let ext = path.extension().and_then(|s| s.to_str());
        if ext != Some("yaml") && ext != Some("yml") {
            continue;
        }

        let job: JobDefinition = read_yaml(path)?;
        if !names.insert(job.name.clone()) {
            return Err(ConfigError::InvalidConfig {
                path: path.to_path_buf(),
                reason: format!("duplicate job name '{}'", job.name),
            });
        }
        jobs.push(job);
    }

    jobs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(jobs)
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> ConfigResult<T> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlParse {
        path: path.to_path_buf(),
        source,
    })
}
