// pipewatch-core/src/application/extractor.rs
//
// Turns raw store answers into one scalar per metric family.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::detection::{Extraction, MetricQuery, RawMetric, Reading, parse_timestamp};
use crate::domain::error::DomainError;
use crate::domain::rules::SqlIdentifier;
use crate::ports::EntityStore;

/// Reads one measurement for a family. `rules` names the family members and
/// only feeds error messages.
pub async fn extract(
    store: &dyn EntityStore,
    entity: &SqlIdentifier,
    query: &MetricQuery,
    now: DateTime<Utc>,
    rules: &str,
) -> Result<Extraction, DomainError> {
    let failure = |reason: String| DomainError::ExtractionError {
        entity: entity.to_string(),
        rule: rules.to_string(),
        reason,
    };

    let raw = store
        .measure(entity, query)
        .await
        .map_err(|e| failure(e.to_string()))?;
    debug!(entity = %entity, metric = %query.label(), raw = ?raw, "Raw metric");

    interpret(query, raw, now).map_err(failure)
}

/// Pure half of the extractor: no I/O, `now` is supplied by the caller.
pub fn interpret(
    query: &MetricQuery,
    raw: RawMetric,
    now: DateTime<Utc>,
) -> Result<Extraction, String> {
    match (query, raw) {
        (MetricQuery::RowCount, RawMetric::Count(rows)) => {
            Ok(Extraction::Measured(Reading::new(rows as f64)))
        }
        (MetricQuery::CountAbove { column, bound }, RawMetric::Count(outliers)) => {
            Ok(Extraction::Measured(
                Reading::new(outliers as f64)
                    .with("column", column.as_str())
                    .with("max_value", *bound),
            ))
        }
        (MetricQuery::NullRatio { column }, RawMetric::NullStats { nulls, total }) => {
            if total == 0 {
                return Ok(Extraction::InsufficientData(format!(
                    "no rows to compute null ratio of {}",
                    column
                )));
            }
            Ok(Extraction::Measured(
                Reading::new(nulls as f64 / total as f64)
                    .with("column", column.as_str())
                    .with("null_rows", nulls)
                    .with("total_rows", total),
            ))
        }
        (MetricQuery::DuplicateCount { key }, RawMetric::Count(duplicates)) => {
            Ok(Extraction::Measured(
                Reading::new(duplicates as f64).with("key", key.as_str()),
            ))
        }
        (MetricQuery::Earliest { column }, RawMetric::Earliest(earliest)) => {
            let Some(raw_ts) = earliest else {
                return Ok(Extraction::InsufficientData(format!(
                    "no timestamps in {}",
                    column
                )));
            };
            let oldest = parse_timestamp(&raw_ts)
                .ok_or_else(|| format!("unparsable timestamp '{}' in {}", raw_ts, column))?;
            let minutes = (now - oldest).num_milliseconds() as f64 / 60_000.0;
            Ok(Extraction::Measured(
                Reading::new(minutes)
                    .with("column", column.as_str())
                    .with("oldest_data_timestamp", raw_ts),
            ))
        }
        (query, raw) => Err(format!(
            "store answered {:?} to {}",
            raw,
            query.label()
        )),
    }
}
