// pipewatch-core/src/domain/detection/measurement.rs

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::rules::SqlIdentifier;

/// What to read from a monitored entity. The storage adapter turns each
/// variant into one parameterized query; no other SQL is built from config.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum MetricQuery {
    RowCount,
    CountAbove { column: SqlIdentifier, bound: f64 },
    NullRatio { column: SqlIdentifier },
    DuplicateCount { key: SqlIdentifier },
    Earliest { column: SqlIdentifier },
}

impl MetricQuery {
    /// Evaluation order of families: volume, then data quality, then SLA.
    pub fn rank(&self) -> u8 {
        match self {
            Self::RowCount => 0,
            Self::CountAbove { .. } => 1,
            Self::NullRatio { .. } => 2,
            Self::DuplicateCount { .. } => 3,
            Self::Earliest { .. } => 4,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::RowCount => "row_count".to_string(),
            Self::CountAbove { column, bound } => format!("count_above({}, {})", column, bound),
            Self::NullRatio { column } => format!("null_ratio({})", column),
            Self::DuplicateCount { key } => format!("duplicates({})", key),
            Self::Earliest { column } => format!("earliest({})", column),
        }
    }
}

/// Raw answer from the store, before it becomes a scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum RawMetric {
    Count(u64),
    NullStats { nulls: u64, total: u64 },
    /// Textual minimum of a column; `None` when the column holds no values.
    Earliest(Option<String>),
}

/// One scalar per metric family, plus the context written with any finding.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub value: f64,
    pub context: Map<String, Value>,
}

impl Reading {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            context: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Measured(Reading),
    /// Not enough rows/values to decide; no rule of the family is evaluated.
    InsufficientData(String),
}

/// A triggered rule's values on their way to the audit sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub entity: String,
    pub rule_name: String,
    pub metric_value: f64,
    pub threshold_value: f64,
    pub context: Value,
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parses the timestamp shapes found in bronze tables. Naive values are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // DuckDB renders TIMESTAMPTZ as "2024-01-01 10:00:00+00"
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(ts.with_timezone(&Utc));
    }
    if let Some(naive) = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(naive.and_utc());
    }
    // DATE columns: midnight UTC
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
