// pipewatch-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("Configuration Error: {0}")]
    #[diagnostic(
        code(pipewatch::domain::configuration),
        help("Fix the rule catalog or project file; nothing was evaluated.")
    )]
    ConfigurationError(String),

    #[error("Monitored entity '{0}' does not exist yet")]
    #[diagnostic(code(pipewatch::domain::entity_not_found))]
    EntityNotFound(String),

    #[error("Extraction failed for rule '{rule}' on '{entity}': {reason}")]
    #[diagnostic(
        code(pipewatch::domain::extraction),
        help("The rule is skipped for this run; the other rules still run.")
    )]
    ExtractionError {
        entity: String,
        rule: String,
        reason: String,
    },

    #[error("Could not record finding '{rule}' on '{entity}': {reason}")]
    #[diagnostic(code(pipewatch::domain::audit_write))]
    AuditWriteError {
        entity: String,
        rule: String,
        reason: String,
    },

    #[error("Storage unavailable: {0}")]
    #[diagnostic(
        code(pipewatch::domain::storage_unavailable),
        help("Check the database path (PIPEWATCH_DB_PATH) and that the file exists.")
    )]
    StorageUnavailable(String),
}

impl DomainError {
    /// Fatal errors abort the whole run; everything else is isolated to one rule or entity.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DomainError::ConfigurationError(_) | DomainError::StorageUnavailable(_)
        )
    }
}
