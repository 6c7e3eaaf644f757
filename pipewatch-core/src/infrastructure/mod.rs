// pipewatch-core/src/infrastructure/mod.rs

pub mod adapters;
pub mod config;
pub mod error;
pub mod sql;
