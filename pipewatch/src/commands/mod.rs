// pipewatch/src/commands/mod.rs

pub mod init;
pub mod logs;
pub mod rules;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::Context;
use pipewatch_core::domain::project::ProjectConfig;
use pipewatch_core::infrastructure::config::{load_project_config, resolve_path};

/// Project file plus its paths resolved against the project directory.
pub struct Project {
    pub config: ProjectConfig,
    pub database: String,
    pub rules: PathBuf,
}

impl Project {
    pub fn load(project_dir: &Path) -> anyhow::Result<Self> {
        let config = load_project_config(project_dir).with_context(|| {
            format!(
                "Failed to load project configuration from {:?}",
                project_dir
            )
        })?;
        let database = resolve_path(project_dir, &config.database);
        let rules = PathBuf::from(resolve_path(project_dir, &config.rules));
        Ok(Self {
            config,
            database,
            rules,
        })
    }
}
