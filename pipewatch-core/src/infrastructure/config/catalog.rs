// pipewatch-core/src/infrastructure/config/catalog.rs

use std::fs;
use std::path::Path;
use tracing::{info, instrument};

use crate::domain::error::DomainError;
use crate::domain::rules::{CatalogDocument, RuleCatalog};

/// Reads and validates the rule catalog. Any problem is a configuration
/// error: nothing is evaluated against a half-valid catalog.
#[instrument]
pub fn load_rule_catalog(path: &Path) -> Result<RuleCatalog, DomainError> {
    let content = fs::read_to_string(path).map_err(|e| {
        DomainError::ConfigurationError(format!("cannot read rule catalog {:?}: {}", path, e))
    })?;
    let catalog = parse_rule_catalog(&content)?;
    info!(
        rules = catalog.rule_count(),
        entities = catalog.entities().count(),
        "Rule catalog loaded"
    );
    Ok(catalog)
}

pub fn parse_rule_catalog(content: &str) -> Result<RuleCatalog, DomainError> {
    let document: CatalogDocument = serde_yaml::from_str(content)
        .map_err(|e| DomainError::ConfigurationError(format!("invalid rule catalog: {}", e)))?;
    RuleCatalog::from_document(document)
}
