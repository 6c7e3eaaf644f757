// pipewatch-core/src/application/detector.rs
//
// One detection pass: every monitored entity is measured family by family,
// each family resolves to at most one finding, findings go to the audit sink.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info, instrument, warn};

use crate::application::extractor::extract;
use crate::domain::detection::{
    Decision, Extraction, Finding, Measurement, NewFinding, Reading, plan_families,
};
use crate::domain::error::DomainError;
use crate::domain::project::DetectionConfig;
use crate::domain::rules::{Comparison, RuleCatalog, RuleDefinition, Severity};
use crate::error::PipewatchError;
use crate::ports::{AuditSink, EntityStore};

#[derive(Debug, Clone)]
pub struct DetectionOptions {
    /// Stamped on every finding; a UUID v4 is generated when absent.
    pub run_id: Option<String>,
    pub max_concurrency: usize,
    pub entity_timeout: Duration,
    /// Restrict the pass to one entity.
    pub only_entity: Option<String>,
    /// Reference time for latency rules, captured once per run.
    pub now: Option<DateTime<Utc>>,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

impl DetectionOptions {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            run_id: None,
            max_concurrency: config.max_concurrency,
            entity_timeout: config.entity_timeout(),
            only_entity: None,
            now: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityOutcome {
    Evaluated,
    /// The table does not exist yet; nothing was measured.
    Absent,
    /// Ran past the entity timeout; nothing was recorded.
    TimedOut,
    /// Selected explicitly but the catalog has no rules for it.
    NotMonitored,
    /// The store could not even tell whether the table exists.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityPhase {
    Pending,
    Extracted,
    Resolved,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityReport {
    pub entity: String,
    pub outcome: EntityOutcome,
    pub phase: EntityPhase,
    pub findings: Vec<Finding>,
    /// Rules never checked because a higher-priority rule of their family fired.
    pub suppressed: Vec<String>,
    /// Rules not evaluated (insufficient data or extraction failure), with the reason.
    pub skipped: Vec<(String, String)>,
    pub errors: Vec<String>,
}

impl EntityReport {
    fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            outcome: EntityOutcome::Evaluated,
            phase: EntityPhase::Pending,
            findings: Vec::new(),
            suppressed: Vec::new(),
            skipped: Vec::new(),
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub entities: Vec<EntityReport>,
}

impl RunReport {
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.entities.iter().flat_map(|e| e.findings.iter())
    }

    pub fn finding_count(&self) -> usize {
        self.entities.iter().map(|e| e.findings.len()).sum()
    }

    pub fn error_count(&self) -> usize {
        self.entities.iter().map(|e| e.errors.len()).sum()
    }

    pub fn skipped_count(&self) -> usize {
        self.entities.iter().map(|e| e.skipped.len()).sum()
    }

    pub fn entity(&self, name: &str) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.entity == name)
    }

    pub fn count_outcome(&self, outcome: EntityOutcome) -> usize {
        self.entities.iter().filter(|e| e.outcome == outcome).count()
    }
}

/// Runs one detection pass.
///
/// Only a failed connectivity check aborts the pass. Everything below that is
/// isolated to its rule or entity and reported in the `RunReport`.
#[instrument(skip_all, fields(run_id = tracing::field::Empty))]
pub async fn run_detection(
    catalog: &RuleCatalog,
    store: &dyn EntityStore,
    sink: &dyn AuditSink,
    options: &DetectionOptions,
) -> Result<RunReport, PipewatchError> {
    let run_id = options
        .run_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    tracing::Span::current().record("run_id", run_id.as_str());
    let now = options.now.unwrap_or_else(Utc::now);

    store
        .ping()
        .await
        .map_err(|e| DomainError::StorageUnavailable(e.to_string()))?;

    let entities: Vec<&str> = match options.only_entity.as_deref() {
        Some(name) if catalog.rules_for(name).is_empty() => {
            info!(entity = name, "Entity has no rules, nothing to evaluate");
            let mut report = EntityReport::new(name);
            report.outcome = EntityOutcome::NotMonitored;
            return Ok(RunReport {
                run_id,
                started_at: now,
                entities: vec![report],
            });
        }
        Some(name) => vec![name],
        None => catalog.entities().collect(),
    };

    info!(
        entities = entities.len(),
        concurrency = options.max_concurrency,
        "Starting detection pass"
    );

    let ctx = RunContext {
        catalog,
        store,
        sink,
        run_id: &run_id,
        now,
        entity_timeout: options.entity_timeout,
    };

    let futures = entities.into_iter().map(|entity| ctx.process_entity(entity));
    let mut reports: Vec<EntityReport> = futures::stream::iter(futures)
        .buffer_unordered(options.max_concurrency.max(1))
        .collect()
        .await;
    reports.sort_by(|a, b| a.entity.cmp(&b.entity));

    let report = RunReport {
        run_id,
        started_at: now,
        entities: reports,
    };
    info!(
        findings = report.finding_count(),
        skipped = report.skipped_count(),
        errors = report.error_count(),
        "Detection pass finished"
    );
    Ok(report)
}

struct RunContext<'a> {
    catalog: &'a RuleCatalog,
    store: &'a dyn EntityStore,
    sink: &'a dyn AuditSink,
    run_id: &'a str,
    now: DateTime<Utc>,
    entity_timeout: Duration,
}

impl<'a> RunContext<'a> {
    async fn process_entity(&self, entity: &str) -> EntityReport {
        let mut report = EntityReport::new(entity);

        let evaluated = tokio::time::timeout(
            self.entity_timeout,
            self.evaluate_entity(entity, &mut report),
        )
        .await;
        let staged = match evaluated {
            Ok(staged) => staged,
            Err(_) => {
                warn!(
                    entity,
                    timeout = ?self.entity_timeout,
                    "Entity timed out, no findings recorded"
                );
                report.outcome = EntityOutcome::TimedOut;
                return report;
            }
        };

        // Writes happen outside the timeout: a finding is either fully
        // recorded or reported as a failed write, never half-cancelled.
        for (rule, finding) in staged {
            match self.sink.record(&finding).await {
                Ok(recorded) => {
                    info!(
                        entity,
                        rule = %rule,
                        severity = %recorded.severity,
                        metric = recorded.metric_value,
                        threshold = recorded.threshold_value,
                        "Finding recorded"
                    );
                    report.findings.push(recorded);
                }
                Err(e) => {
                    let err = DomainError::AuditWriteError {
                        entity: entity.to_string(),
                        rule: rule.clone(),
                        reason: e.to_string(),
                    };
                    error!("{}", err);
                    report.errors.push(err.to_string());
                }
            }
        }

        report
    }

    /// PENDING → EXTRACTED → RESOLVED. Returns the findings to write, in
    /// family order.
    async fn evaluate_entity(
        &self,
        entity: &str,
        report: &mut EntityReport,
    ) -> Vec<(String, NewFinding)> {
        let rules = self.catalog.rules_for(entity);
        let families = plan_families(rules);
        let Some(identifier) = rules.values().next().map(|r| &r.entity) else {
            report.phase = EntityPhase::Resolved;
            return Vec::new();
        };

        match self.store.entity_exists(identifier).await {
            Ok(true) => {}
            Ok(false) => {
                let absent = DomainError::EntityNotFound(entity.to_string());
                info!("{}, skipping", absent);
                report.outcome = EntityOutcome::Absent;
                return Vec::new();
            }
            Err(e) => {
                error!(entity, error = %e, "Could not check entity");
                report.outcome = EntityOutcome::Failed;
                report.errors.push(e.to_string());
                return Vec::new();
            }
        }

        // 1. Extract one reading per family
        let mut readings: Vec<Option<Reading>> = Vec::with_capacity(families.len());
        for family in &families {
            let names = family.rule_names().join(",");
            match extract(self.store, identifier, &family.query, self.now, &names).await {
                Ok(Extraction::Measured(reading)) => readings.push(Some(reading)),
                Ok(Extraction::InsufficientData(reason)) => {
                    info!(entity, rules = %names, reason = %reason, "Insufficient data");
                    report.skipped.extend(
                        family
                            .rules
                            .iter()
                            .map(|r| (r.name.clone(), reason.clone())),
                    );
                    readings.push(None);
                }
                Err(e) => {
                    warn!("{}", e);
                    report
                        .skipped
                        .extend(family.rules.iter().map(|r| (r.name.clone(), e.to_string())));
                    readings.push(None);
                }
            }
        }
        report.phase = EntityPhase::Extracted;

        // 2. Resolve each family to at most one finding
        let mut staged = Vec::new();
        for (family, reading) in families.iter().zip(readings) {
            let Some(reading) = reading else { continue };
            let resolution = family.resolve(reading.value);
            let suppressed: Vec<String> =
                resolution.suppressed.iter().map(|r| r.name.clone()).collect();

            if let Some((rule, decision)) = resolution.winner {
                let measurement = Measurement {
                    entity: entity.to_string(),
                    rule_name: rule.name.clone(),
                    metric_value: decision.metric_value,
                    threshold_value: decision.threshold_value,
                    context: finding_context(rule, &decision, reading, &suppressed),
                };
                staged.push((
                    rule.name.clone(),
                    NewFinding::from_measurement(rule, measurement, Some(self.run_id)),
                ));
            }
            report.suppressed.extend(suppressed);
        }
        report.phase = EntityPhase::Resolved;

        staged
    }
}

/// JSON stored in `meta_data`: the reading's own context plus a note per kind.
fn finding_context(
    rule: &RuleDefinition,
    decision: &Decision,
    reading: Reading,
    suppressed: &[String],
) -> Value {
    let mut context = reading.context;

    let note = match &rule.comparison {
        Comparison::MaxRows { .. } if rule.severity == Severity::Critical => {
            Some("Batch exceeded max row count threshold.".to_string())
        }
        Comparison::MaxRows { .. } => Some("Volume is elevated (Trend Shift detected).".into()),
        Comparison::MinRows { .. } => Some("Batch dropped below min row count threshold.".into()),
        Comparison::MinTotalRows { .. } => Some("Significant data loss detected.".into()),
        Comparison::SafeRange { low, high } => {
            context.insert("min_safe_rows".into(), json!(low));
            context.insert("max_safe_rows".into(), json!(high));
            Some("Healthy batch detected (Heartbeat).".into())
        }
        Comparison::MaxValueOnColumn { bound, .. } => Some(format!(
            "Found {} records above {}.",
            decision.metric_value, bound
        )),
        Comparison::MaxDuplicateCount { key, .. } => Some(format!(
            "Detected excess duplicates based on {} key.",
            key
        )),
        Comparison::MaxNullPercentage { .. } | Comparison::MaxLatencyMinutes { .. } => None,
    };
    if let Some(note) = note {
        context.insert("note".into(), Value::String(note));
    }
    if !suppressed.is_empty() {
        context.insert("suppressed".into(), json!(suppressed));
    }

    Value::Object(context)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::detection::{MetricQuery, RawMetric};
    use crate::domain::rules::{Category, SqlIdentifier};
    use crate::infrastructure::adapters::DuckDBStore;
    use crate::infrastructure::config::parse_rule_catalog;
    use crate::ports::AuditReader;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    const RULES: &str = r#"
entities:
  bronze_customers:
    row_count_drop: { check: min_rows, min_rows: 10, severity: CRITICAL }
  bronze_order_payments:
    duplicates: { check: max_duplicate_count, column: order_id, max_duplicate_count: 0, severity: CRITICAL }
    row_count_deletion: { check: min_total_rows, min_total_rows: 1000, severity: CRITICAL }
  bronze_orders:
    data_latency: { check: max_latency_minutes, column: order_purchase_timestamp, max_latency_minutes: 60, severity: CRITICAL }
  bronze_order_items:
    row_count_spike: { check: max_rows, max_rows: 2000, severity: CRITICAL }
    sustained_volume_shift: { check: max_rows, max_batch_rows: 200, severity: WARNING }
    price_outlier: { check: max_value_on_column, column: price, max_value: 50000, severity: CRITICAL }
  bronze_products:
    null_injection: { check: max_null_percentage, column: product_category_name, max_null_percentage: 0.05, severity: WARNING }
"#;

    const FIXTURE: &str = r#"
CREATE TABLE bronze_customers AS SELECT range AS customer_id FROM range(5);
CREATE TABLE bronze_order_payments AS SELECT 'order_' || CAST(range % 500 AS VARCHAR) AS order_id FROM range(1000);
CREATE TABLE bronze_orders (order_id VARCHAR, order_purchase_timestamp TIMESTAMP);
INSERT INTO bronze_orders VALUES ('a', '2018-08-31 12:00:00'), ('b', '2018-09-03 11:00:00');
CREATE TABLE bronze_order_items AS
    SELECT range AS item_id, CASE WHEN range < 3 THEN 99999.0 ELSE 10.0 END AS price FROM range(2500);
CREATE TABLE bronze_products AS
    SELECT range AS product_id, CASE WHEN range < 6 THEN NULL ELSE 'moveis' END AS product_category_name
    FROM range(100);
"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 9, 3, 12, 0, 0).unwrap()
    }

    fn options() -> DetectionOptions {
        DetectionOptions {
            run_id: Some("run-test".into()),
            now: Some(now()),
            ..DetectionOptions::default()
        }
    }

    async fn olist_store() -> Result<DuckDBStore> {
        let store = DuckDBStore::in_memory()?;
        store.ensure_audit_log().await?;
        store.execute_batch(FIXTURE).await?;
        Ok(store)
    }

    fn only(report: &EntityReport) -> &Finding {
        assert_eq!(report.findings.len(), 1, "{:?}", report);
        &report.findings[0]
    }

    #[tokio::test]
    async fn test_full_pass_on_olist_fixture() -> Result<()> {
        let store = olist_store().await?;
        let catalog = parse_rule_catalog(RULES)?;

        let report = run_detection(&catalog, &store, &store, &options()).await?;
        assert_eq!(report.run_id, "run-test");

        let customers = only(report.entity("bronze_customers").unwrap());
        assert_eq!(customers.rule_name, "row_count_drop");
        assert_eq!(customers.metric_value, 5.0);
        assert_eq!(customers.threshold_value, 10.0);
        assert_eq!(customers.severity, Severity::Critical);
        assert_eq!(customers.category, Category::Volume);
        assert_eq!(customers.run_id.as_deref(), Some("run-test"));

        let payments = only(report.entity("bronze_order_payments").unwrap());
        assert_eq!(payments.rule_name, "duplicates");
        assert_eq!(payments.metric_value, 500.0);
        assert_eq!(payments.threshold_value, 0.0);
        assert_eq!(payments.category, Category::DataQuality);

        let orders = only(report.entity("bronze_orders").unwrap());
        assert_eq!(orders.metric_value, 4320.0);
        assert_eq!(orders.threshold_value, 60.0);
        assert_eq!(orders.category, Category::Sla);
        let ctx = orders.context.as_ref().unwrap();
        assert_eq!(ctx["oldest_data_timestamp"], "2018-08-31 12:00:00");

        let products = only(report.entity("bronze_products").unwrap());
        assert_eq!(products.metric_value, 0.06);
        assert_eq!(products.context.as_ref().unwrap()["total_rows"], 100);

        assert_eq!(report.finding_count(), 6);
        assert_eq!(report.error_count(), 0);
        assert_eq!(store.recent(100).await?.len(), 6);
        Ok(())
    }

    #[tokio::test]
    async fn test_payments_keep_total_rows_and_flag_duplicates() -> Result<()> {
        let store = olist_store().await?;
        let catalog = parse_rule_catalog(RULES)?;
        let opts = DetectionOptions {
            only_entity: Some("bronze_order_payments".into()),
            ..options()
        };

        let report = run_detection(&catalog, &store, &store, &opts).await?;
        let payments = report.entity("bronze_order_payments").unwrap();
        assert_eq!(payments.outcome, EntityOutcome::Evaluated);
        let dup = only(payments);
        assert_eq!(dup.rule_name, "duplicates");
        assert_eq!(dup.metric_value, 500.0);
        assert_eq!(dup.threshold_value, 0.0);
        // 1000 rows sits on the deletion floor without crossing it.
        assert!(payments.suppressed.is_empty());
        assert_eq!(report.finding_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_table_is_absent() -> Result<()> {
        let store = olist_store().await?;
        let catalog = parse_rule_catalog(
            r#"
entities:
  bronze_sellers:
    row_count_deletion: { check: min_total_rows, min_total_rows: 1000, severity: CRITICAL }
"#,
        )?;

        let report = run_detection(&catalog, &store, &store, &options()).await?;
        let sellers = report.entity("bronze_sellers").unwrap();
        assert_eq!(sellers.outcome, EntityOutcome::Absent);
        assert!(sellers.findings.is_empty());
        assert_eq!(report.error_count(), 0);
        assert!(store.recent(10).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_catalog_entity_matches_table_regardless_of_case() -> Result<()> {
        let store = olist_store().await?;
        let catalog = parse_rule_catalog(
            r#"
entities:
  Bronze_Customers:
    row_count_drop: { check: min_rows, min_rows: 10, severity: CRITICAL }
"#,
        )?;

        let report = run_detection(&catalog, &store, &store, &options()).await?;
        let customers = report.entity("Bronze_Customers").unwrap();
        assert_eq!(customers.outcome, EntityOutcome::Evaluated);
        assert_eq!(only(customers).metric_value, 5.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_latency_on_date_column() -> Result<()> {
        let store = DuckDBStore::in_memory()?;
        store.ensure_audit_log().await?;
        store
            .execute_batch(
                "CREATE TABLE bronze_orders (order_id VARCHAR, order_purchase_timestamp DATE);
                 INSERT INTO bronze_orders VALUES ('a', '2018-08-31'), ('b', '2018-09-02');",
            )
            .await?;
        let catalog = parse_rule_catalog(RULES)?;
        let opts = DetectionOptions {
            only_entity: Some("bronze_orders".into()),
            ..options()
        };

        let report = run_detection(&catalog, &store, &store, &opts).await?;
        let orders = report.entity("bronze_orders").unwrap();
        assert_eq!(orders.outcome, EntityOutcome::Evaluated);
        assert!(orders.errors.is_empty(), "{:?}", orders.errors);
        let late = only(orders);
        assert_eq!(late.rule_name, "data_latency");
        // 2018-08-31 00:00 UTC to 2018-09-03 12:00 UTC
        assert_eq!(late.metric_value, 5040.0);
        assert_eq!(late.threshold_value, 60.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_spike_wins_over_shift() -> Result<()> {
        let store = olist_store().await?;
        let catalog = parse_rule_catalog(RULES)?;
        let opts = DetectionOptions {
            only_entity: Some("bronze_order_items".into()),
            ..options()
        };

        let report = run_detection(&catalog, &store, &store, &opts).await?;
        let items = report.entity("bronze_order_items").unwrap();
        assert_eq!(items.phase, EntityPhase::Resolved);

        let volume: Vec<&Finding> = items
            .findings
            .iter()
            .filter(|f| f.category == Category::Volume)
            .collect();
        assert_eq!(volume.len(), 1);
        assert_eq!(volume[0].rule_name, "row_count_spike");
        assert_eq!(volume[0].severity, Severity::Critical);
        assert_eq!(volume[0].metric_value, 2500.0);
        assert_eq!(items.suppressed, vec!["sustained_volume_shift".to_string()]);

        // The outlier family is independent of the volume family.
        let outlier = items
            .findings
            .iter()
            .find(|f| f.rule_name == "price_outlier")
            .unwrap();
        assert_eq!(outlier.metric_value, 3.0);
        assert_eq!(
            outlier.context.as_ref().unwrap()["note"],
            "Found 3 records above 50000."
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_sequence_ids_and_event_times_are_monotonic() -> Result<()> {
        let store = olist_store().await?;
        let catalog = parse_rule_catalog(RULES)?;
        run_detection(&catalog, &store, &store, &options()).await?;
        run_detection(&catalog, &store, &store, &options()).await?;

        let mut all = store.recent(100).await?;
        all.reverse();
        assert_eq!(all.len(), 12);
        for pair in all.windows(2) {
            assert!(pair[1].sequence_id > pair[0].sequence_id);
            assert!(pair[1].event_time >= pair[0].event_time);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_unmonitored_entity_yields_nothing() -> Result<()> {
        let store = olist_store().await?;
        let catalog = parse_rule_catalog(RULES)?;
        let opts = DetectionOptions {
            only_entity: Some("bronze_geolocation".into()),
            ..options()
        };

        let report = run_detection(&catalog, &store, &store, &opts).await?;
        assert_eq!(report.finding_count(), 0);
        assert_eq!(report.count_outcome(EntityOutcome::NotMonitored), 1);
        assert!(store.recent(10).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_below_threshold_records_nothing() -> Result<()> {
        let store = DuckDBStore::in_memory()?;
        store.ensure_audit_log().await?;
        store
            .execute_batch(
                "CREATE TABLE bronze_products AS
                 SELECT CASE WHEN range < 5 THEN NULL ELSE 'moveis' END AS product_category_name
                 FROM range(100);",
            )
            .await?;
        let catalog = parse_rule_catalog(RULES)?;
        let opts = DetectionOptions {
            only_entity: Some("bronze_products".into()),
            ..options()
        };

        let report = run_detection(&catalog, &store, &store, &opts).await?;
        assert_eq!(report.finding_count(), 0);
        assert_eq!(report.entity("bronze_products").unwrap().outcome, EntityOutcome::Evaluated);
        Ok(())
    }

    #[tokio::test]
    async fn test_extraction_failure_is_isolated_to_its_family() -> Result<()> {
        let store = olist_store().await?;
        let catalog = parse_rule_catalog(
            r#"
entities:
  bronze_customers:
    row_count_drop: { check: min_rows, min_rows: 10, severity: CRITICAL }
    email_nulls: { check: max_null_percentage, column: customer_email, max_null_percentage: 0.1 }
"#,
        )?;

        let report = run_detection(&catalog, &store, &store, &options()).await?;
        let customers = report.entity("bronze_customers").unwrap();
        assert_eq!(only(customers).rule_name, "row_count_drop");
        assert_eq!(customers.skipped.len(), 1);
        assert_eq!(customers.skipped[0].0, "email_nulls");
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_table_is_insufficient_data() -> Result<()> {
        let store = DuckDBStore::in_memory()?;
        store.ensure_audit_log().await?;
        store
            .execute_batch("CREATE TABLE bronze_orders (order_purchase_timestamp TIMESTAMP)")
            .await?;
        let catalog = parse_rule_catalog(RULES)?;
        let opts = DetectionOptions {
            only_entity: Some("bronze_orders".into()),
            ..options()
        };

        let report = run_detection(&catalog, &store, &store, &opts).await?;
        let orders = report.entity("bronze_orders").unwrap();
        assert!(orders.findings.is_empty());
        assert_eq!(orders.skipped.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_audit_write_failure_does_not_stop_the_run() -> Result<()> {
        // No audit table: every write fails.
        let store = DuckDBStore::in_memory()?;
        store.execute_batch(FIXTURE).await?;
        let catalog = parse_rule_catalog(RULES)?;

        let report = run_detection(&catalog, &store, &store, &options()).await?;
        assert_eq!(report.finding_count(), 0);
        assert_eq!(report.error_count(), 6);
        assert!(
            report
                .entity("bronze_customers")
                .unwrap()
                .errors[0]
                .contains("row_count_drop")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_heartbeat_only_when_no_fault_fires() -> Result<()> {
        let store = olist_store().await?;
        let catalog = parse_rule_catalog(
            r#"
entities:
  bronze_customers:
    row_count_spike: { check: max_rows, max_rows: 2000, severity: CRITICAL }
    data_ingestion_success: { check: safe_range, min_safe_rows: 1, max_safe_rows: 10, severity: INFO }
  bronze_order_items:
    row_count_spike: { check: max_rows, max_rows: 2000, severity: CRITICAL }
    data_ingestion_success: { check: safe_range, min_safe_rows: 1, max_safe_rows: 5000, severity: INFO }
"#,
        )?;

        let report = run_detection(&catalog, &store, &store, &options()).await?;

        let healthy = only(report.entity("bronze_customers").unwrap());
        assert_eq!(healthy.rule_name, "data_ingestion_success");
        assert_eq!(healthy.severity, Severity::Info);
        assert_eq!(healthy.threshold_value, 0.0);
        let ctx = healthy.context.as_ref().unwrap();
        assert_eq!(ctx["note"], "Healthy batch detected (Heartbeat).");
        assert_eq!(ctx["min_safe_rows"], 1);

        let items = report.entity("bronze_order_items").unwrap();
        assert_eq!(only(items).rule_name, "row_count_spike");
        assert_eq!(items.suppressed, vec!["data_ingestion_success".to_string()]);
        Ok(())
    }

    // --- Fakes for timing and outage behaviour ---

    struct SlowStore {
        delay: Duration,
        reachable: bool,
    }

    #[async_trait]
    impl EntityStore for SlowStore {
        async fn ping(&self) -> Result<(), PipewatchError> {
            if self.reachable {
                Ok(())
            } else {
                Err(PipewatchError::InternalError("connection refused".into()))
            }
        }

        async fn entity_exists(&self, _entity: &SqlIdentifier) -> Result<bool, PipewatchError> {
            Ok(true)
        }

        async fn measure(
            &self,
            _entity: &SqlIdentifier,
            _query: &MetricQuery,
        ) -> Result<RawMetric, PipewatchError> {
            tokio::time::sleep(self.delay).await;
            Ok(RawMetric::Count(1))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        written: Mutex<Vec<NewFinding>>,
    }

    #[async_trait]
    impl AuditSink for RecordingSink {
        async fn record(&self, finding: &NewFinding) -> Result<Finding, PipewatchError> {
            let mut written = self.written.lock().unwrap();
            written.push(finding.clone());
            Ok(Finding {
                sequence_id: written.len() as i64,
                event_time: Utc::now(),
                entity: finding.entity.clone(),
                category: finding.category,
                rule_name: finding.rule_name.clone(),
                severity: finding.severity,
                metric_value: finding.metric_value,
                threshold_value: finding.threshold_value,
                context: Some(finding.context.clone()),
                run_id: finding.run_id.clone(),
            })
        }
    }

    #[tokio::test]
    async fn test_timed_out_entity_records_nothing() -> Result<()> {
        let store = SlowStore {
            delay: Duration::from_secs(5),
            reachable: true,
        };
        let sink = RecordingSink::default();
        let catalog = parse_rule_catalog(RULES)?;
        let opts = DetectionOptions {
            entity_timeout: Duration::from_millis(50),
            only_entity: Some("bronze_customers".into()),
            ..options()
        };

        let report = run_detection(&catalog, &store, &sink, &opts).await?;
        let customers = report.entity("bronze_customers").unwrap();
        assert_eq!(customers.outcome, EntityOutcome::TimedOut);
        assert_eq!(customers.phase, EntityPhase::Pending);
        assert!(sink.written.lock().unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_fast_fake_store_records_through_sink() -> Result<()> {
        let store = SlowStore {
            delay: Duration::from_millis(1),
            reachable: true,
        };
        let sink = RecordingSink::default();
        let catalog = parse_rule_catalog(RULES)?;
        let opts = DetectionOptions {
            only_entity: Some("bronze_customers".into()),
            ..options()
        };

        let report = run_detection(&catalog, &store, &sink, &opts).await?;
        assert_eq!(report.finding_count(), 1);
        let written = sink.written.lock().unwrap();
        assert_eq!(written[0].rule_name, "row_count_drop");
        assert_eq!(written[0].metric_value, 1.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_store_is_fatal() -> Result<()> {
        let store = SlowStore {
            delay: Duration::ZERO,
            reachable: false,
        };
        let sink = RecordingSink::default();
        let catalog = parse_rule_catalog(RULES)?;

        let res = run_detection(&catalog, &store, &sink, &options()).await;
        assert!(matches!(
            res,
            Err(PipewatchError::Domain(DomainError::StorageUnavailable(_)))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_generated_run_id_is_a_uuid() -> Result<()> {
        let store = olist_store().await?;
        let catalog = parse_rule_catalog(RULES)?;
        let opts = DetectionOptions {
            run_id: None,
            ..options()
        };
        let report = run_detection(&catalog, &store, &store, &opts).await?;
        assert!(uuid::Uuid::parse_str(&report.run_id).is_ok());
        assert!(report.findings().all(|f| f.run_id.as_deref() == Some(report.run_id.as_str())));
        Ok(())
    }
}
