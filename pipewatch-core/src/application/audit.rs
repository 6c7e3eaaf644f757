// pipewatch-core/src/application/audit.rs

use tracing::{debug, instrument};

use crate::domain::detection::Finding;
use crate::domain::error::DomainError;
use crate::error::PipewatchError;
use crate::ports::AuditReader;

pub const DEFAULT_LOG_LIMIT: usize = 10;
pub const MAX_LOG_LIMIT: usize = 1000;

/// Most recent findings, newest first. Oversized limits are capped.
#[instrument(skip(reader))]
pub async fn recent_findings(
    reader: &dyn AuditReader,
    limit: usize,
) -> Result<Vec<Finding>, PipewatchError> {
    if limit == 0 {
        return Err(DomainError::ConfigurationError("log limit must be at least 1".into()).into());
    }
    let findings = reader.recent(limit.min(MAX_LOG_LIMIT)).await?;
    debug!(count = findings.len(), "Recent findings loaded");
    Ok(findings)
}
