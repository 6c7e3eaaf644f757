// pipewatch-core/src/infrastructure/config/mod.rs

pub mod catalog;
pub mod project;

pub use catalog::{load_rule_catalog, parse_rule_catalog};
pub use project::{load_project_config, resolve_path};
