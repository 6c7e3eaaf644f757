// pipewatch-core/src/ports/audit.rs

use crate::domain::detection::{Finding, NewFinding};
use crate::error::PipewatchError;
use async_trait::async_trait;

/// Append-only destination for findings.
///
/// Implementations must be safe under concurrent `record` calls: sequence ids
/// are assigned atomically and strictly increase in write order.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, finding: &NewFinding) -> Result<Finding, PipewatchError>;
}

/// Read side used by the log viewer.
#[async_trait]
pub trait AuditReader: Send + Sync {
    /// Most recent findings first.
    async fn recent(&self, limit: usize) -> Result<Vec<Finding>, PipewatchError>;
}
