// pipewatch-core/src/domain/rules/catalog.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use validator::Validate;

use super::definition::{Comparison, ComparisonKind, RuleDefinition};
use super::identifier::SqlIdentifier;
use super::severity::Severity;
use crate::domain::error::DomainError;

// --- CONFIGURATION STRUCTS (as written in YAML) ---

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct CatalogDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default)]
    pub entities: BTreeMap<String, BTreeMap<String, RawRule>>,
}

/// One rule entry before validation. Operands are flat optional keys, the
/// same shape operators already write by hand.
#[derive(Debug, Deserialize, Serialize, Validate, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct RawRule {
    pub check: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    #[validate(length(min = 1, message = "column cannot be empty"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,

    #[serde(default, alias = "max_batch_rows", skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rows: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_total_rows: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,

    #[validate(range(min = 0.0, max = 1.0, message = "must be a ratio between 0 and 1"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_null_percentage: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duplicate_count: Option<u64>,

    #[validate(range(min = 0.0, message = "latency bound cannot be negative"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency_minutes: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_safe_rows: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_safe_rows: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RawRule {
    fn present_operands(&self) -> Vec<&'static str> {
        let flags = [
            ("column", self.column.is_some()),
            ("max_rows", self.max_rows.is_some()),
            ("min_rows", self.min_rows.is_some()),
            ("min_total_rows", self.min_total_rows.is_some()),
            ("max_value", self.max_value.is_some()),
            ("max_null_percentage", self.max_null_percentage.is_some()),
            ("max_duplicate_count", self.max_duplicate_count.is_some()),
            ("max_latency_minutes", self.max_latency_minutes.is_some()),
            ("min_safe_rows", self.min_safe_rows.is_some()),
            ("max_safe_rows", self.max_safe_rows.is_some()),
        ];
        flags
            .into_iter()
            .filter_map(|(key, present)| present.then_some(key))
            .collect()
    }

    /// Checks the entry against its declared kind and builds the typed rule.
    pub fn into_definition(
        self,
        entity: &SqlIdentifier,
        name: &str,
    ) -> Result<RuleDefinition, String> {
        self.validate().map_err(|e| e.to_string())?;

        let kind = ComparisonKind::from_str(&self.check)?;

        let present = self.present_operands();
        let missing: Vec<&str> = kind
            .operands()
            .iter()
            .copied()
            .filter(|op| !present.contains(op))
            .collect();
        if !missing.is_empty() {
            return Err(format!(
                "check '{}' requires {}",
                kind,
                missing.join(", ")
            ));
        }
        let unexpected: Vec<&str> = present
            .iter()
            .copied()
            .filter(|op| !kind.operands().contains(op))
            .collect();
        if !unexpected.is_empty() {
            return Err(format!(
                "check '{}' does not use {}",
                kind,
                unexpected.join(", ")
            ));
        }

        let comparison = match kind {
            ComparisonKind::MaxRows => Comparison::MaxRows {
                bound: required(self.max_rows, "max_rows")?,
            },
            ComparisonKind::MinRows => Comparison::MinRows {
                bound: required(self.min_rows, "min_rows")?,
            },
            ComparisonKind::MinTotalRows => Comparison::MinTotalRows {
                bound: required(self.min_total_rows, "min_total_rows")?,
            },
            ComparisonKind::MaxValueOnColumn => Comparison::MaxValueOnColumn {
                column: column(self.column.as_deref())?,
                bound: finite(self.max_value, "max_value")?,
            },
            ComparisonKind::MaxNullPercentage => Comparison::MaxNullPercentage {
                column: column(self.column.as_deref())?,
                bound: finite(self.max_null_percentage, "max_null_percentage")?,
            },
            ComparisonKind::MaxDuplicateCount => Comparison::MaxDuplicateCount {
                key: column(self.column.as_deref())?,
                bound: required(self.max_duplicate_count, "max_duplicate_count")?,
            },
            ComparisonKind::MaxLatencyMinutes => Comparison::MaxLatencyMinutes {
                column: column(self.column.as_deref())?,
                bound: finite(self.max_latency_minutes, "max_latency_minutes")?,
            },
            ComparisonKind::SafeRange => {
                let low = required(self.min_safe_rows, "min_safe_rows")?;
                let high = required(self.max_safe_rows, "max_safe_rows")?;
                if low > high {
                    return Err(format!(
                        "min_safe_rows ({}) is greater than max_safe_rows ({})",
                        low, high
                    ));
                }
                Comparison::SafeRange { low, high }
            }
        };

        let severity = match self.severity.as_deref() {
            Some(raw) => Severity::from_str(raw)?,
            None => Severity::default(),
        };

        Ok(RuleDefinition {
            entity: entity.clone(),
            name: name.to_string(),
            comparison,
            severity,
            priority: self.priority,
            description: self.description,
        })
    }
}

fn required<T>(value: Option<T>, key: &str) -> Result<T, String> {
    value.ok_or_else(|| format!("missing '{}'", key))
}

fn finite(value: Option<f64>, key: &str) -> Result<f64, String> {
    let v = required(value, key)?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("'{}' must be a finite number", key))
    }
}

fn column(raw: Option<&str>) -> Result<SqlIdentifier, String> {
    SqlIdentifier::parse(required(raw, "column")?)
}

// --- RUNTIME CATALOG ---

static NO_RULES: BTreeMap<String, RuleDefinition> = BTreeMap::new();

/// Validated, read-only rule set keyed by entity then rule name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleCatalog {
    entities: BTreeMap<String, BTreeMap<String, RuleDefinition>>,
}

impl RuleCatalog {
    /// Validates every entry. All problems are reported together.
    pub fn from_document(document: CatalogDocument) -> Result<Self, DomainError> {
        let mut entities = BTreeMap::new();
        let mut problems = Vec::new();

        for (entity_name, raw_rules) in document.entities {
            let entity = match SqlIdentifier::parse(&entity_name) {
                Ok(id) => id,
                Err(e) => {
                    problems.push(format!("entity {}", e));
                    continue;
                }
            };

            let mut rules = BTreeMap::new();
            for (rule_name, raw) in raw_rules {
                if rule_name.trim().is_empty() {
                    problems.push(format!("{}: rule name cannot be empty", entity));
                    continue;
                }
                match raw.into_definition(&entity, &rule_name) {
                    Ok(rule) => {
                        rules.insert(rule_name, rule);
                    }
                    Err(e) => problems.push(format!("{}.{}: {}", entity, rule_name, e)),
                }
            }
            entities.insert(entity_name, rules);
        }

        if !problems.is_empty() {
            return Err(DomainError::ConfigurationError(problems.join("; ")));
        }

        Ok(Self { entities })
    }

    /// Rules for an entity. Unknown entities are simply not monitored.
    pub fn rules_for(&self, entity: &str) -> &BTreeMap<String, RuleDefinition> {
        self.entities.get(entity).unwrap_or(&NO_RULES)
    }

    pub fn rule_for(&self, entity: &str, name: &str) -> Option<&RuleDefinition> {
        self.rules_for(entity).get(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn rule_count(&self) -> usize {
        self.entities.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rule_count() == 0
    }
}
