// pipewatch-core/src/domain/detection/evaluator.rs

use serde::Serialize;

use crate::domain::rules::{Comparison, RuleDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decision {
    pub triggered: bool,
    pub metric_value: f64,
    pub threshold_value: f64,
}

pub struct RuleEvaluator;

impl RuleEvaluator {
    /// Applies the rule's comparison to an extracted metric.
    ///
    /// Comparisons are exact: no rounding and no tolerance band. For
    /// `safe_range` a triggered decision means "healthy batch", not a fault.
    pub fn evaluate(rule: &RuleDefinition, metric: f64) -> Decision {
        let comparison = &rule.comparison;
        let triggered = match comparison {
            Comparison::MaxRows { bound } => metric > *bound as f64,
            Comparison::MinRows { bound } | Comparison::MinTotalRows { bound } => {
                metric < *bound as f64
            }
            // The metric is already the count of rows above the bound.
            Comparison::MaxValueOnColumn { .. } => metric > 0.0,
            Comparison::MaxNullPercentage { bound, .. } => metric > *bound,
            Comparison::MaxDuplicateCount { bound, .. } => metric > *bound as f64,
            Comparison::MaxLatencyMinutes { bound, .. } => metric > *bound,
            Comparison::SafeRange { low, high } => *low as f64 <= metric && metric <= *high as f64,
        };

        Decision {
            triggered,
            metric_value: metric,
            threshold_value: comparison.threshold_value(),
        }
    }
}
