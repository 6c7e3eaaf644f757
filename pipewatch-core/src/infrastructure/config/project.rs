// pipewatch-core/src/infrastructure/config/project.rs

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use validator::Validate;

use crate::domain::project::ProjectConfig;
use crate::infrastructure::error::InfrastructureError;

const CONFIG_CANDIDATES: [&str; 2] = ["pipewatch.yaml", "pipewatch_project_conf.yaml"];

pub const DB_PATH_ENV: &str = "PIPEWATCH_DB_PATH";
pub const RULES_ENV: &str = "PIPEWATCH_RULES";

#[instrument(skip(project_dir))]
pub fn load_project_config(project_dir: &Path) -> Result<ProjectConfig, InfrastructureError> {
    // 1. Discover the project file
    let config_path = find_main_config(project_dir)?;
    info!(path = ?config_path, "Loading project configuration");

    // 2. Base YAML
    let content = fs::read_to_string(&config_path)?;
    let mut config: ProjectConfig = serde_yaml::from_str(&content)?;

    // 3. Environment layering (PIPEWATCH_DB_PATH=/data/prod.duckdb pipewatch run)
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    config
        .validate()
        .map_err(|e| InfrastructureError::ConfigError(e.to_string()))?;

    Ok(config)
}

fn find_main_config(root: &Path) -> Result<PathBuf, InfrastructureError> {
    for filename in CONFIG_CANDIDATES {
        let p = root.join(filename);
        if p.exists() {
            return Ok(p);
        }
    }
    Err(InfrastructureError::ConfigNotFound(format!(
        "No configuration file found in {:?}. Checked: {:?}",
        root, CONFIG_CANDIDATES
    )))
}

fn apply_env_overrides(config: &mut ProjectConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup(DB_PATH_ENV) {
        info!(old = ?config.database, new = ?val, "Overriding database path via ENV");
        config.database = val;
    }
    if let Some(val) = lookup(RULES_ENV) {
        info!(old = ?config.rules, new = ?val, "Overriding rule catalog via ENV");
        config.rules = val;
    }
}

/// Relative paths in the project file are relative to the project directory.
/// `:memory:` is passed through untouched.
pub fn resolve_path(project_dir: &Path, raw: &str) -> String {
    let path = Path::new(raw);
    if raw == ":memory:" || path.is_absolute() {
        raw.to_string()
    } else {
        project_dir.join(path).to_string_lossy().into_owned()
    }
}
