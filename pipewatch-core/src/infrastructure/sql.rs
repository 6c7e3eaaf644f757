// pipewatch-core/src/infrastructure/sql.rs
//
// Every statement the detector runs lives here. Identifiers arrive as
// validated `SqlIdentifier`s and are always quoted; numeric operands are bound
// as parameters.

use crate::domain::detection::MetricQuery;
use crate::domain::rules::SqlIdentifier;

pub const CREATE_AUDIT_LOG_SQL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS anomaly_audit_log_seq START 1;
CREATE TABLE IF NOT EXISTS anomaly_audit_log (
    log_id BIGINT PRIMARY KEY DEFAULT nextval('anomaly_audit_log_seq'),
    event_timestamp TIMESTAMP DEFAULT current_timestamp,
    source_table VARCHAR NOT NULL,
    anomaly_category VARCHAR NOT NULL,
    check_name VARCHAR,
    severity VARCHAR DEFAULT 'INFO',
    metric_value DOUBLE,
    threshold_value DOUBLE,
    meta_data VARCHAR,
    run_id VARCHAR
);
"#;

pub const INSERT_FINDING_SQL: &str = r#"
INSERT INTO anomaly_audit_log
    (event_timestamp, source_table, anomaly_category, check_name, severity,
     metric_value, threshold_value, meta_data, run_id)
VALUES (CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?, ?, ?, ?)
RETURNING log_id
"#;

pub const RECENT_FINDINGS_SQL: &str = r#"
SELECT log_id, CAST(event_timestamp AS VARCHAR), source_table, anomaly_category,
       check_name, severity, metric_value, threshold_value, meta_data, run_id
FROM anomaly_audit_log
ORDER BY log_id DESC
LIMIT ?
"#;

// Unquoted DuckDB identifiers resolve case-insensitively, so the lookup does too.
pub const ENTITY_EXISTS_SQL: &str = "SELECT COUNT(*) FROM information_schema.tables \
     WHERE table_schema = current_schema() AND lower(table_name) = lower(?)";

/// A measurement statement and its optional bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSql {
    pub sql: String,
    pub bound: Option<f64>,
}

pub fn metric_sql(entity: &SqlIdentifier, query: &MetricQuery) -> MetricSql {
    let table = entity.quoted();
    match query {
        MetricQuery::RowCount => MetricSql {
            sql: format!("SELECT COUNT(*) FROM {}", table),
            bound: None,
        },
        MetricQuery::CountAbove { column, bound } => MetricSql {
            sql: format!(
                "SELECT COUNT(*) FROM {} WHERE {} > ?",
                table,
                column.quoted()
            ),
            bound: Some(*bound),
        },
        MetricQuery::NullRatio { column } => MetricSql {
            sql: format!(
                "SELECT COUNT(*) - COUNT({}), COUNT(*) FROM {}",
                column.quoted(),
                table
            ),
            bound: None,
        },
        // Null keys are not duplicates of each other.
        MetricQuery::DuplicateCount { key } => MetricSql {
            sql: format!(
                "SELECT COUNT({k}) - COUNT(DISTINCT {k}) FROM {t}",
                k = key.quoted(),
                t = table
            ),
            bound: None,
        },
        MetricQuery::Earliest { column } => MetricSql {
            sql: format!(
                "SELECT CAST(MIN({}) AS VARCHAR) FROM {}",
                column.quoted(),
                table
            ),
            bound: None,
        },
    }
}
