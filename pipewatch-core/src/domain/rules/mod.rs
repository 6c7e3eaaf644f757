// pipewatch-core/src/domain/rules/mod.rs

pub mod catalog;
pub mod definition;
pub mod identifier;
pub mod severity;

pub use catalog::{CatalogDocument, RawRule, RuleCatalog};
pub use definition::{Category, Comparison, ComparisonKind, RuleDefinition};
pub use identifier::SqlIdentifier;
pub use severity::Severity;
