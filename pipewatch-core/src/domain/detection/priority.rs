// pipewatch-core/src/domain/detection/priority.rs
//
// Rules of one entity that read the same measurement form a family. Inside a
// family only the first triggered rule is recorded; the order is explicit and
// computed here, never inferred from branch order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::evaluator::{Decision, RuleEvaluator};
use super::measurement::MetricQuery;
use crate::domain::rules::{Comparison, RuleDefinition};

/// One metric family with its rules in checking order.
#[derive(Debug, Clone)]
pub struct FamilyPlan<'a> {
    pub query: MetricQuery,
    pub rules: Vec<&'a RuleDefinition>,
}

/// Outcome of walking a family's priority list.
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
    pub winner: Option<(&'a RuleDefinition, Decision)>,
    /// Lower-priority rules that were never checked because of the winner.
    pub suppressed: Vec<&'a RuleDefinition>,
}

impl<'a> FamilyPlan<'a> {
    /// First triggered rule wins; everything after it is suppressed.
    pub fn resolve(&self, metric: f64) -> Resolution<'a> {
        for (idx, rule) in self.rules.iter().enumerate() {
            let decision = RuleEvaluator::evaluate(rule, metric);
            if decision.triggered {
                return Resolution {
                    winner: Some((*rule, decision)),
                    suppressed: self.rules[idx + 1..].to_vec(),
                };
            }
        }
        Resolution {
            winner: None,
            suppressed: Vec::new(),
        }
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Groups an entity's rules into families, ordered volume → quality → SLA.
pub fn plan_families(rules: &BTreeMap<String, RuleDefinition>) -> Vec<FamilyPlan<'_>> {
    let mut families: Vec<FamilyPlan<'_>> = Vec::new();

    for rule in rules.values() {
        let query = rule.comparison.query();
        match families.iter_mut().find(|f| f.query == query) {
            Some(family) => family.rules.push(rule),
            None => families.push(FamilyPlan {
                query,
                rules: vec![rule],
            }),
        }
    }

    for family in &mut families {
        family.rules.sort_by(|a, b| priority_order(a, b));
    }
    families.sort_by_key(|f| f.query.rank());
    families
}

/// Checking order inside a family:
/// 1. explicit `priority` (lower first, configured before unconfigured)
/// 2. fault rules before heartbeat rules
/// 3. higher severity first
/// 4. more extreme bound first (higher for `max_*`, lower for `min_*`)
/// 5. rule name
pub fn priority_order(a: &RuleDefinition, b: &RuleDefinition) -> Ordering {
    let explicit = match (a.priority, b.priority) {
        (Some(pa), Some(pb)) => pa.cmp(&pb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    explicit
        .then_with(|| {
            a.comparison
                .is_heartbeat()
                .cmp(&b.comparison.is_heartbeat())
        })
        .then_with(|| b.severity.cmp(&a.severity))
        .then_with(|| extremity_order(&a.comparison, &b.comparison))
        .then_with(|| a.name.cmp(&b.name))
}

enum Direction {
    Upper(f64),
    Lower(f64),
}

fn direction(comparison: &Comparison) -> Option<Direction> {
    match comparison {
        Comparison::MaxRows { bound } => Some(Direction::Upper(*bound as f64)),
        Comparison::MaxDuplicateCount { bound, .. } => Some(Direction::Upper(*bound as f64)),
        Comparison::MaxNullPercentage { bound, .. } | Comparison::MaxLatencyMinutes { bound, .. } => {
            Some(Direction::Upper(*bound))
        }
        Comparison::MinRows { bound } | Comparison::MinTotalRows { bound } => {
            Some(Direction::Lower(*bound as f64))
        }
        // Outlier rules with different bounds never share a family.
        Comparison::MaxValueOnColumn { .. } | Comparison::SafeRange { .. } => None,
    }
}

fn extremity_order(a: &Comparison, b: &Comparison) -> Ordering {
    match (direction(a), direction(b)) {
        (Some(Direction::Upper(x)), Some(Direction::Upper(y))) => y.total_cmp(&x),
        (Some(Direction::Lower(x)), Some(Direction::Lower(y))) => x.total_cmp(&y),
        _ => Ordering::Equal,
    }
}
