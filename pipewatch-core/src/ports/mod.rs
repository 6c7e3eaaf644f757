// pipewatch-core/src/ports/mod.rs

pub mod audit;
pub mod entity_store;

pub use audit::{AuditReader, AuditSink};
pub use entity_store::EntityStore;
