// pipewatch-core/src/domain/mod.rs

pub mod detection;
pub mod error;
pub mod project;
pub mod rules;

pub use error::DomainError;
