//! Directory structure and file generation for .bulk-kit initialization.

use super::error::{InitError, InitResult};
use super::templates::{get_template, list_templates};
use crate::config::loader::CONFIG_DIR;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Job template written in minimal mode.
const MINIMAL_JOB: &str = "jobs/health-check.yaml";

/// Options for initializing a .bulk-kit directory.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Target directory where .bulk-kit will be created.
    pub target_dir: PathBuf,

    /// Overwrite existing .bulk-kit directory if it exists.
    pub force: bool,

    /// Create minimal template (only the health-check job).
    pub minimal: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            target_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            force: false,
            minimal: false,
        }
    }
}

/// Generate a complete .bulk-kit directory structure with templates.
///
/// This function creates the following structure:
/// ```text
/// .bulk-kit/
/// ├── config.toml
/// ├── directory.yaml
/// └── jobs/
///     ├── health-check.yaml
///     └── ... (every other example job, unless minimal)
/// ```
///
/// # Arguments
/// * `options` - Configuration for the initialization process
///
/// # Returns
/// The paths of the written files, or an `InitError` if:
/// - The .bulk-kit directory already exists (without force flag)
/// - A template file cannot be found
/// - File system operations fail
pub async fn generate_bulk_kit_structure(options: InitOptions) -> InitResult<Vec<PathBuf>> {
    let bk_dir = options.target_dir.join(CONFIG_DIR);

    if bk_dir.exists() && !options.force {
        return Err(InitError::DirectoryExists(bk_dir));
    }

    fs::create_dir_all(bk_dir.join("jobs")).map_err(|source| InitError::DirectoryCreate {
        path: bk_dir.join("jobs"),
        source,
    })?;

    let mut templates = vec!["config.toml".to_string(), "directory.yaml".to_string()];
    if options.minimal {
        templates.push(MINIMAL_JOB.to_string());
    } else {
        templates.extend(list_templates("jobs/"));
    }

    let mut written = Vec::with_capacity(templates.len());
    for template in &templates {
        written.push(write_template_file(&bk_dir, template)?);
    }
    debug!(dir = %bk_dir.display(), files = written.len(), "project initialized");

    Ok(written)
}

/// Write one embedded template below `bk_dir` and return its path.
fn write_template_file(bk_dir: &Path, template_path: &str) -> InitResult<PathBuf> {
    let content = get_template(template_path)
        .ok_or_else(|| InitError::TemplateNotFound(template_path.to_string()))?;

    let target_path = bk_dir.join(template_path);

    if let Some(parent) = target_path.parent() {
        fs::create_dir_all(parent).map_err(|source| InitError::DirectoryCreate {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    fs::write(&target_path, content).map_err(|source| InitError::FileWrite {
        path: target_path.clone(),
        source,
    })?;

    Ok(target_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::load_config;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_generated_project_loads() {
        let dir = tempdir().unwrap();
        let options = InitOptions {
            target_dir: dir.path().to_path_buf(),
            force: false,
            minimal: false,
        };

        let written = generate_bulk_kit_structure(options).await.unwrap();

        let bk_dir = dir.path().join(CONFIG_DIR);
        assert!(bk_dir.join("config.toml").exists());
        assert!(bk_dir.join("directory.yaml").exists());
        assert!(bk_dir.join("jobs/school-year-transition.yaml").exists());
        assert_eq!(written.len(), 2 + list_templates("jobs/").len());

        let config = load_config(dir.path()).await.unwrap();
        assert!(config.find_job("archive-teams").is_some());
        assert!(!config.directory.teams.is_empty());
    }

    #[tokio::test]
    async fn test_generate_structure_minimal() {
        let dir = tempdir().unwrap();
        let options = InitOptions {
            target_dir: dir.path().to_path_buf(),
            force: false,
            minimal: true,
        };

        generate_bulk_kit_structure(options).await.unwrap();

        let jobs_dir = dir.path().join(CONFIG_DIR).join("jobs");
        assert!(jobs_dir.join("health-check.yaml").exists());
        assert!(!jobs_dir.join("archive-teams.yaml").exists());
    }

    #[tokio::test]
    async fn test_existing_directory_requires_force() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(CONFIG_DIR)).unwrap();

        let options = InitOptions {
            target_dir: dir.path().to_path_buf(),
            force: false,
            minimal: true,
        };
        let result = generate_bulk_kit_structure(options.clone()).await;
        assert!(matches!(result, Err(InitError::DirectoryExists(_))));

        let forced = InitOptions {
            force: true,
            ..options
        };
        assert!(generate_bulk_kit_structure(forced).await.is_ok());
    }

    #[tokio::test]
    async fn test_force_overwrites_edited_files() {
        let dir = tempdir().unwrap();
        let options = InitOptions {
            target_dir: dir.path().to_path_buf(),
            force: true,
            minimal: true,
        };
        generate_bulk_kit_structure(options.clone()).await.unwrap();

        let config_path = dir.path().join(CONFIG_DIR).join("config.toml");
        fs::write(&config_path, "retention_secs = 1").unwrap();
        generate_bulk_kit_structure(options).await.unwrap();

        let content = fs::read_to_string(config_path).unwrap();
        assert!(content.contains("retention_secs = 300"));
    }
}
