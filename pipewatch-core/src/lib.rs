// pipewatch-core/src/lib.rs

// 1. Documentation
#![allow(missing_docs)]
// 2. Memory safety
#![deny(unsafe_code)]
// 3. Robustness
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
// 4. Performance
#![warn(clippy::perf)]

// --- HEXAGONAL MODULES ---

// 1. Ports (Interfaces / Traits)
// Contracts with the storage collaborator (EntityStore, AuditSink, AuditReader).
pub mod ports;

// 2. Domain
// Rule catalog, evaluator, priority resolution, findings.
// Depends on nothing else in the crate.
pub mod domain;

// 3. Infrastructure (Adapters)
// DuckDB, YAML config loaders, SQL builder.
pub mod infrastructure;

// 4. Application (Use Cases)
// Detection pass, audit log reading.
pub mod application;

// --- GLOBAL ERROR HANDLING ---
pub mod error;

// --- RE-EXPORTS (FACADE) ---
pub use error::PipewatchError;
