// pipewatch-core/src/domain/rules/definition.rs

use serde::{Deserialize, Serialize};
use std::fmt;

use super::identifier::SqlIdentifier;
use super::severity::Severity;
use crate::domain::detection::measurement::MetricQuery;

/// Audit category a finding is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Volume")]
    Volume,
    #[serde(rename = "Data_Quality")]
    DataQuality,
    #[serde(rename = "SLA")]
    Sla,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Volume => "Volume",
            Self::DataQuality => "Data_Quality",
            Self::Sla => "SLA",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Volume" => Ok(Self::Volume),
            "Data_Quality" => Ok(Self::DataQuality),
            "SLA" => Ok(Self::Sla),
            _ => Err(format!("Unknown anomaly category: {}", s)),
        }
    }
}

/// The `check:` discriminant of a rule entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonKind {
    MaxRows,
    MinRows,
    MaxValueOnColumn,
    MaxNullPercentage,
    MaxDuplicateCount,
    MinTotalRows,
    MaxLatencyMinutes,
    SafeRange,
}

impl ComparisonKind {
    pub const ALL: [ComparisonKind; 8] = [
        Self::MaxRows,
        Self::MinRows,
        Self::MaxValueOnColumn,
        Self::MaxNullPercentage,
        Self::MaxDuplicateCount,
        Self::MinTotalRows,
        Self::MaxLatencyMinutes,
        Self::SafeRange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxRows => "max_rows",
            Self::MinRows => "min_rows",
            Self::MaxValueOnColumn => "max_value_on_column",
            Self::MaxNullPercentage => "max_null_percentage",
            Self::MaxDuplicateCount => "max_duplicate_count",
            Self::MinTotalRows => "min_total_rows",
            Self::MaxLatencyMinutes => "max_latency_minutes",
            Self::SafeRange => "safe_range",
        }
    }

    /// Operand keys a rule entry of this kind must carry, and may carry nothing else.
    pub fn operands(&self) -> &'static [&'static str] {
        match self {
            Self::MaxRows => &["max_rows"],
            Self::MinRows => &["min_rows"],
            Self::MaxValueOnColumn => &["column", "max_value"],
            Self::MaxNullPercentage => &["column", "max_null_percentage"],
            Self::MaxDuplicateCount => &["column", "max_duplicate_count"],
            Self::MinTotalRows => &["min_total_rows"],
            Self::MaxLatencyMinutes => &["column", "max_latency_minutes"],
            Self::SafeRange => &["min_safe_rows", "max_safe_rows"],
        }
    }
}

impl fmt::Display for ComparisonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ComparisonKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
                format!("Unknown check '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// A validated comparison with its operands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Comparison {
    MaxRows { bound: u64 },
    MinRows { bound: u64 },
    MaxValueOnColumn { column: SqlIdentifier, bound: f64 },
    MaxNullPercentage { column: SqlIdentifier, bound: f64 },
    /// Single-column key. Composite keys would extend this variant and
    /// `MetricQuery::DuplicateCount` together.
    MaxDuplicateCount { key: SqlIdentifier, bound: u64 },
    MinTotalRows { bound: u64 },
    MaxLatencyMinutes { column: SqlIdentifier, bound: f64 },
    SafeRange { low: u64, high: u64 },
}

impl Comparison {
    pub fn kind(&self) -> ComparisonKind {
        match self {
            Self::MaxRows { .. } => ComparisonKind::MaxRows,
            Self::MinRows { .. } => ComparisonKind::MinRows,
            Self::MaxValueOnColumn { .. } => ComparisonKind::MaxValueOnColumn,
            Self::MaxNullPercentage { .. } => ComparisonKind::MaxNullPercentage,
            Self::MaxDuplicateCount { .. } => ComparisonKind::MaxDuplicateCount,
            Self::MinTotalRows { .. } => ComparisonKind::MinTotalRows,
            Self::MaxLatencyMinutes { .. } => ComparisonKind::MaxLatencyMinutes,
            Self::SafeRange { .. } => ComparisonKind::SafeRange,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Self::MaxRows { .. }
            | Self::MinRows { .. }
            | Self::MinTotalRows { .. }
            | Self::SafeRange { .. } => Category::Volume,
            Self::MaxValueOnColumn { .. }
            | Self::MaxNullPercentage { .. }
            | Self::MaxDuplicateCount { .. } => Category::DataQuality,
            Self::MaxLatencyMinutes { .. } => Category::Sla,
        }
    }

    /// The measurement this comparison reads. Rules whose queries are equal
    /// share one metric family on their entity.
    pub fn query(&self) -> MetricQuery {
        match self {
            Self::MaxRows { .. }
            | Self::MinRows { .. }
            | Self::MinTotalRows { .. }
            | Self::SafeRange { .. } => MetricQuery::RowCount,
            Self::MaxValueOnColumn { column, bound } => MetricQuery::CountAbove {
                column: column.clone(),
                bound: *bound,
            },
            Self::MaxNullPercentage { column, .. } => MetricQuery::NullRatio {
                column: column.clone(),
            },
            Self::MaxDuplicateCount { key, .. } => MetricQuery::DuplicateCount { key: key.clone() },
            Self::MaxLatencyMinutes { column, .. } => MetricQuery::Earliest {
                column: column.clone(),
            },
        }
    }

    /// Value written to `threshold_value` when the rule fires. Heartbeats
    /// record 0; their bounds go in the finding context.
    pub fn threshold_value(&self) -> f64 {
        match self {
            Self::MaxRows { bound } | Self::MinRows { bound } | Self::MinTotalRows { bound } => {
                *bound as f64
            }
            Self::MaxDuplicateCount { bound, .. } => *bound as f64,
            Self::MaxValueOnColumn { bound, .. }
            | Self::MaxNullPercentage { bound, .. }
            | Self::MaxLatencyMinutes { bound, .. } => *bound,
            Self::SafeRange { .. } => 0.0,
        }
    }

    /// Heartbeat rules report health instead of a fault.
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::SafeRange { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleDefinition {
    pub entity: SqlIdentifier,
    pub name: String,
    pub comparison: Comparison,
    pub severity: Severity,
    /// Explicit rank inside a metric family (lower is checked first).
    pub priority: Option<u32>,
    pub description: Option<String>,
}

impl RuleDefinition {
    pub fn category(&self) -> Category {
        self.comparison.category()
    }

    pub fn kind(&self) -> ComparisonKind {
        self.comparison.kind()
    }
}
