// pipewatch-core/src/ports/entity_store.rs

// Read side of the storage collaborator. The detector only ever asks for one
// typed measurement at a time and never writes through this port.

use crate::domain::detection::{MetricQuery, RawMetric};
use crate::domain::rules::SqlIdentifier;
use crate::error::PipewatchError;
use async_trait::async_trait;

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Cheap connectivity check run once before a detection pass.
    async fn ping(&self) -> Result<(), PipewatchError>;

    /// `false` on a fresh system where the bronze table was never loaded.
    async fn entity_exists(&self, entity: &SqlIdentifier) -> Result<bool, PipewatchError>;

    async fn measure(
        &self,
        entity: &SqlIdentifier,
        query: &MetricQuery,
    ) -> Result<RawMetric, PipewatchError>;
}
