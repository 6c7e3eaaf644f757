// pipewatch-core/src/domain/project/configuration.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct ProjectConfig {
    pub name: String,

    /// DuckDB file holding the bronze tables and the audit log.
    #[serde(default = "default_database")]
    pub database: String,

    /// Rule catalog, relative to the project directory.
    #[serde(default = "default_rules")]
    pub rules: String,

    #[validate(nested)]
    #[serde(default)]
    pub detection: DetectionConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct DetectionConfig {
    #[validate(range(min = 1, max = 64, message = "max_concurrency must be between 1 and 64"))]
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[validate(range(min = 1, message = "entity_timeout_secs must be at least 1"))]
    #[serde(default = "default_entity_timeout_secs")]
    pub entity_timeout_secs: u64,
}

impl DetectionConfig {
    pub fn entity_timeout(&self) -> Duration {
        Duration::from_secs(self.entity_timeout_secs)
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            entity_timeout_secs: default_entity_timeout_secs(),
        }
    }
}

fn default_database() -> String {
    "pipewatch.duckdb".to_string()
}
fn default_rules() -> String {
    "config/anomaly_rules.yml".to_string()
}
fn default_max_concurrency() -> usize {
    4
}
fn default_entity_timeout_secs() -> u64 {
    30
}
