// pipewatch-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipewatchError {
    // --- DOMAIN (catalog, detection taxonomy) ---
    #[error(transparent)]
    Domain(#[from] DomainError),

    // --- INFRASTRUCTURE (DuckDB, IO, parsing) ---
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    #[error("Internal Error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for PipewatchError {
    fn from(err: std::io::Error) -> Self {
        PipewatchError::Infrastructure(InfrastructureError::Io(err))
    }
}

impl From<duckdb::Error> for PipewatchError {
    fn from(err: duckdb::Error) -> Self {
        PipewatchError::Infrastructure(InfrastructureError::from(err))
    }
}
