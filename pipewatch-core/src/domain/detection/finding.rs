// pipewatch-core/src/domain/detection/finding.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::measurement::Measurement;
use crate::domain::rules::{Category, RuleDefinition, Severity};

/// A finding before the sink assigns its sequence id and event time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewFinding {
    pub entity: String,
    pub category: Category,
    pub rule_name: String,
    pub severity: Severity,
    pub metric_value: f64,
    pub threshold_value: f64,
    pub context: Value,
    pub run_id: Option<String>,
}

impl NewFinding {
    /// Category and severity are copied verbatim from the rule.
    pub fn from_measurement(
        rule: &RuleDefinition,
        measurement: Measurement,
        run_id: Option<&str>,
    ) -> Self {
        Self {
            entity: measurement.entity,
            category: rule.category(),
            rule_name: measurement.rule_name,
            severity: rule.severity,
            metric_value: measurement.metric_value,
            threshold_value: measurement.threshold_value,
            context: measurement.context,
            run_id: run_id.map(str::to_string),
        }
    }
}

/// A persisted audit record. Never updated or deleted by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub sequence_id: i64,
    pub event_time: DateTime<Utc>,
    pub entity: String,
    pub category: Category,
    pub rule_name: String,
    pub severity: Severity,
    pub metric_value: f64,
    pub threshold_value: f64,
    pub context: Option<Value>,
    pub run_id: Option<String>,
}
