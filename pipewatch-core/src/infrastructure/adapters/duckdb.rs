// pipewatch-core/src/infrastructure/adapters/duckdb.rs

use async_trait::async_trait;
use chrono::{NaiveDateTime, SubsecRound, Utc};
use duckdb::{Config, Connection, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

use crate::domain::detection::{Finding, MetricQuery, NewFinding, RawMetric};
use crate::domain::rules::{Category, Severity, SqlIdentifier};
use crate::error::PipewatchError;
use crate::infrastructure::error::{DatabaseError, InfrastructureError};
use crate::infrastructure::sql::{
    CREATE_AUDIT_LOG_SQL, ENTITY_EXISTS_SQL, INSERT_FINDING_SQL, MetricSql, RECENT_FINDINGS_SQL,
    metric_sql,
};
use crate::ports::{AuditReader, AuditSink, EntityStore};

struct Inner {
    conn: Connection,
    // Last event time handed out, so concurrent appends never go backwards.
    last_event: Option<NaiveDateTime>,
}

/// One DuckDB connection serving both the bronze reads and the audit appends.
///
/// All access goes through a mutex on a blocking thread, which serialises
/// appends and lets callers put timeouts around any call.
pub struct DuckDBStore {
    inner: Arc<Mutex<Inner>>,
    location: String,
}

impl DuckDBStore {
    /// Opens an existing database; a missing file is reported, never created.
    pub fn open(db_path: &str) -> Result<Self, InfrastructureError> {
        if db_path != ":memory:" && !Path::new(db_path).exists() {
            return Err(DatabaseError::NotFound(db_path.to_string()).into());
        }
        Self::connect(db_path)
    }

    /// Opens the database, creating the file when needed (used by `init`).
    pub fn open_or_create(db_path: &str) -> Result<Self, InfrastructureError> {
        Self::connect(db_path)
    }

    pub fn in_memory() -> Result<Self, InfrastructureError> {
        Self::connect(":memory:")
    }

    fn connect(db_path: &str) -> Result<Self, InfrastructureError> {
        let config = Config::default();
        let conn = if db_path == ":memory:" {
            Connection::open_in_memory_with_flags(config)?
        } else {
            Connection::open_with_flags(db_path, config)?
        };

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                conn,
                last_event: None,
            })),
            location: db_path.to_string(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Creates the audit sequence and table if they do not exist.
    #[instrument(skip(self), fields(db = %self.location))]
    pub async fn ensure_audit_log(&self) -> Result<(), PipewatchError> {
        self.with_inner(|inner| {
            inner.conn.execute_batch(CREATE_AUDIT_LOG_SQL)?;
            Ok(())
        })
        .await
    }

    /// Runs raw statements; used to prepare fixtures and ad-hoc maintenance.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), PipewatchError> {
        let sql = sql.to_string();
        self.with_inner(move |inner| {
            inner.conn.execute_batch(&sql)?;
            Ok(())
        })
        .await
    }

    async fn with_inner<T, F>(&self, f: F) -> Result<T, PipewatchError>
    where
        F: FnOnce(&mut Inner) -> Result<T, InfrastructureError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let joined = tokio::task::spawn_blocking(move || {
            let mut guard = inner.lock().map_err(|_| {
                InfrastructureError::Io(std::io::Error::other("DuckDB Mutex Poisoned"))
            })?;
            f(&mut guard)
        })
        .await
        .map_err(|e| PipewatchError::InternalError(format!("DuckDB task failed: {}", e)))?;

        joined.map_err(PipewatchError::from)
    }
}

fn to_count(value: i64, column: &str) -> Result<u64, InfrastructureError> {
    u64::try_from(value).map_err(|_| {
        DatabaseError::Decode {
            column: column.to_string(),
            reason: format!("negative count {}", value),
        }
        .into()
    })
}

#[async_trait]
impl EntityStore for DuckDBStore {
    async fn ping(&self) -> Result<(), PipewatchError> {
        self.with_inner(|inner| {
            inner.conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))?;
            Ok(())
        })
        .await
    }

    async fn entity_exists(&self, entity: &SqlIdentifier) -> Result<bool, PipewatchError> {
        let name = entity.to_string();
        self.with_inner(move |inner| {
            let count: i64 =
                inner
                    .conn
                    .query_row(ENTITY_EXISTS_SQL, params![name], |row| row.get(0))?;
            Ok(count > 0)
        })
        .await
    }

    #[instrument(skip(self), fields(entity = %entity, metric = %query.label()))]
    async fn measure(
        &self,
        entity: &SqlIdentifier,
        query: &MetricQuery,
    ) -> Result<RawMetric, PipewatchError> {
        let MetricSql { sql, bound } = metric_sql(entity, query);
        let query = query.clone();
        debug!(%sql, "Measuring");

        self.with_inner(move |inner| {
            let conn = &inner.conn;
            match query {
                MetricQuery::NullRatio { .. } => {
                    let (nulls, total): (i64, i64) =
                        conn.query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?)))?;
                    Ok(RawMetric::NullStats {
                        nulls: to_count(nulls, "nulls")?,
                        total: to_count(total, "total")?,
                    })
                }
                MetricQuery::Earliest { .. } => {
                    let earliest: Option<String> = conn.query_row(&sql, [], |row| row.get(0))?;
                    Ok(RawMetric::Earliest(earliest))
                }
                MetricQuery::RowCount
                | MetricQuery::CountAbove { .. }
                | MetricQuery::DuplicateCount { .. } => {
                    let count: i64 = match bound {
                        Some(b) => conn.query_row(&sql, params![b], |row| row.get(0))?,
                        None => conn.query_row(&sql, [], |row| row.get(0))?,
                    };
                    Ok(RawMetric::Count(to_count(count, "count")?))
                }
            }
        })
        .await
    }
}

#[async_trait]
impl AuditSink for DuckDBStore {
    async fn record(&self, finding: &NewFinding) -> Result<Finding, PipewatchError> {
        let finding = finding.clone();
        self.with_inner(move |inner| {
            // DuckDB keeps microseconds; truncate so the returned record matches the stored one.
            let now = Utc::now().naive_utc().trunc_subsecs(6);
            let event = match inner.last_event {
                Some(last) if last > now => last,
                _ => now,
            };
            let event_str = event.format("%Y-%m-%d %H:%M:%S%.6f").to_string();
            let meta_data =
                serde_json::to_string(&finding.context).map_err(|e| DatabaseError::Decode {
                    column: "meta_data".into(),
                    reason: e.to_string(),
                })?;

            let log_id: i64 = inner.conn.query_row(
                INSERT_FINDING_SQL,
                params![
                    event_str,
                    finding.entity,
                    finding.category.as_str(),
                    finding.rule_name,
                    finding.severity.as_str(),
                    finding.metric_value,
                    finding.threshold_value,
                    meta_data,
                    finding.run_id,
                ],
                |row| row.get(0),
            )?;
            inner.last_event = Some(event);

            Ok(Finding {
                sequence_id: log_id,
                event_time: event.and_utc(),
                entity: finding.entity,
                category: finding.category,
                rule_name: finding.rule_name,
                severity: finding.severity,
                metric_value: finding.metric_value,
                threshold_value: finding.threshold_value,
                context: Some(finding.context),
                run_id: finding.run_id,
            })
        })
        .await
    }
}

struct AuditRow {
    log_id: i64,
    event_timestamp: String,
    source_table: String,
    anomaly_category: String,
    check_name: Option<String>,
    severity: Option<String>,
    metric_value: Option<f64>,
    threshold_value: Option<f64>,
    meta_data: Option<String>,
    run_id: Option<String>,
}

impl AuditRow {
    fn into_finding(self) -> Result<Finding, InfrastructureError> {
        let decode = |column: &str, reason: String| DatabaseError::Decode {
            column: column.to_string(),
            reason,
        };

        let event_time = NaiveDateTime::parse_from_str(&self.event_timestamp, "%Y-%m-%d %H:%M:%S%.f")
            .map_err(|e| decode("event_timestamp", e.to_string()))?
            .and_utc();
        let category = self
            .anomaly_category
            .parse::<Category>()
            .map_err(|e: String| decode("anomaly_category", e))?;
        let severity = match self.severity.as_deref() {
            Some(raw) => raw
                .parse::<Severity>()
                .map_err(|e: String| decode("severity", e))?,
            None => Severity::default(),
        };
        // Rows written by other tools may carry plain text instead of JSON.
        let context = self.meta_data.map(|raw| {
            serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
        });

        Ok(Finding {
            sequence_id: self.log_id,
            event_time,
            entity: self.source_table,
            category,
            rule_name: self.check_name.unwrap_or_default(),
            severity,
            metric_value: self.metric_value.unwrap_or_default(),
            threshold_value: self.threshold_value.unwrap_or_default(),
            context,
            run_id: self.run_id,
        })
    }
}

#[async_trait]
impl AuditReader for DuckDBStore {
    async fn recent(&self, limit: usize) -> Result<Vec<Finding>, PipewatchError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_inner(move |inner| {
            let mut stmt = inner.conn.prepare(RECENT_FINDINGS_SQL)?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(AuditRow {
                    log_id: row.get(0)?,
                    event_timestamp: row.get(1)?,
                    source_table: row.get(2)?,
                    anomaly_category: row.get(3)?,
                    check_name: row.get(4)?,
                    severity: row.get(5)?,
                    metric_value: row.get(6)?,
                    threshold_value: row.get(7)?,
                    meta_data: row.get(8)?,
                    run_id: row.get(9)?,
                })
            })?;

            let mut findings = Vec::new();
            for row in rows {
                findings.push(row?.into_finding()?);
            }
            Ok(findings)
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn id(s: &str) -> SqlIdentifier {
        SqlIdentifier::parse(s).unwrap()
    }

    fn new_finding(rule: &str) -> NewFinding {
        NewFinding {
            entity: "bronze_customers".into(),
            category: Category::Volume,
            rule_name: rule.into(),
            severity: Severity::Critical,
            metric_value: 5.0,
            threshold_value: 10.0,
            context: serde_json::json!({ "note": "Batch dropped below min row count threshold." }),
            run_id: Some("run-1".into()),
        }
    }

    #[tokio::test]
    async fn test_measure_flow() -> Result<()> {
        let store = DuckDBStore::in_memory()?;
        store
            .execute_batch(
                "CREATE TABLE bronze_products (product_id INTEGER, product_category_name VARCHAR);
                 INSERT INTO bronze_products VALUES (1, 'moveis'), (2, NULL), (3, 'beleza'), (3, NULL);",
            )
            .await?;

        let products = id("bronze_products");
        assert!(store.entity_exists(&products).await?);
        assert!(!store.entity_exists(&id("bronze_sellers")).await?);

        assert_eq!(
            store.measure(&products, &MetricQuery::RowCount).await?,
            RawMetric::Count(4)
        );
        assert_eq!(
            store
                .measure(
                    &products,
                    &MetricQuery::NullRatio {
                        column: id("product_category_name")
                    }
                )
                .await?,
            RawMetric::NullStats { nulls: 2, total: 4 }
        );
        assert_eq!(
            store
                .measure(&products, &MetricQuery::DuplicateCount { key: id("product_id") })
                .await?,
            RawMetric::Count(1)
        );
        assert_eq!(
            store
                .measure(
                    &products,
                    &MetricQuery::CountAbove {
                        column: id("product_id"),
                        bound: 1.5
                    }
                )
                .await?,
            RawMetric::Count(3)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_entity_lookup_ignores_case_and_other_schemas() -> Result<()> {
        let store = DuckDBStore::in_memory()?;
        store
            .execute_batch(
                "CREATE TABLE bronze_customers (customer_id INTEGER);
                 CREATE SCHEMA archive;
                 CREATE TABLE archive.bronze_sellers (seller_id INTEGER);",
            )
            .await?;

        assert!(store.entity_exists(&id("Bronze_Customers")).await?);
        assert!(store.entity_exists(&id("BRONZE_CUSTOMERS")).await?);
        assert!(!store.entity_exists(&id("bronze_sellers")).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_earliest_on_empty_table_is_none() -> Result<()> {
        let store = DuckDBStore::in_memory()?;
        store
            .execute_batch("CREATE TABLE bronze_orders (order_purchase_timestamp TIMESTAMP)")
            .await?;
        let res = store
            .measure(
                &id("bronze_orders"),
                &MetricQuery::Earliest {
                    column: id("order_purchase_timestamp"),
                },
            )
            .await?;
        assert_eq!(res, RawMetric::Earliest(None));
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_column_is_an_error() -> Result<()> {
        let store = DuckDBStore::in_memory()?;
        store.execute_batch("CREATE TABLE bronze_orders (order_id VARCHAR)").await?;
        let res = store
            .measure(
                &id("bronze_orders"),
                &MetricQuery::NullRatio {
                    column: id("does_not_exist"),
                },
            )
            .await;
        assert!(res.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_record_and_read_back() -> Result<()> {
        let store = DuckDBStore::in_memory()?;
        store.ensure_audit_log().await?;
        // Idempotent
        store.ensure_audit_log().await?;

        let first = store.record(&new_finding("row_count_drop")).await?;
        let second = store.record(&new_finding("row_count_drop_again")).await?;
        assert!(second.sequence_id > first.sequence_id);
        assert!(second.event_time >= first.event_time);

        let recent = store.recent(10).await?;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0], second);
        assert_eq!(recent[1], first);
        assert_eq!(recent[1].context.as_ref().unwrap()["note"], "Batch dropped below min row count threshold.");

        assert_eq!(store.recent(1).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_record_without_audit_table_fails() -> Result<()> {
        let store = DuckDBStore::in_memory()?;
        assert!(store.record(&new_finding("row_count_drop")).await.is_err());
        Ok(())
    }

    #[test]
    fn test_open_missing_file_is_not_found() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("missing.duckdb");
        let res = DuckDBStore::open(&path.to_string_lossy());
        assert!(matches!(
            res,
            Err(InfrastructureError::Database(DatabaseError::NotFound(_)))
        ));
        assert!(!path.exists());
        Ok(())
    }
}
