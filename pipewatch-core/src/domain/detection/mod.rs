// pipewatch-core/src/domain/detection/mod.rs

pub mod evaluator;
pub mod finding;
pub mod measurement;
pub mod priority;

pub use evaluator::{Decision, RuleEvaluator};
pub use finding::{Finding, NewFinding};
pub use measurement::{Extraction, Measurement, MetricQuery, RawMetric, Reading, parse_timestamp};
pub use priority::{FamilyPlan, Resolution, plan_families, priority_order};
