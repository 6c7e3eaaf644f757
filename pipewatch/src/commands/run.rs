// pipewatch/src/commands/run.rs
//
// USE CASE: Run a detection pass.

use std::path::PathBuf;

use anyhow::Context;
use pipewatch_core::PipewatchError;
use pipewatch_core::application::{DetectionOptions, EntityOutcome, RunReport, run_detection};
use pipewatch_core::domain::rules::Severity;
use pipewatch_core::infrastructure::adapters::DuckDBStore;
use pipewatch_core::infrastructure::config::load_rule_catalog;

use super::Project;

pub async fn execute(
    project_dir: PathBuf,
    entity: Option<String>,
    run_id: Option<String>,
) -> anyhow::Result<()> {
    let start = std::time::Instant::now();

    // A. Configuration (fatal on any error)
    println!("⚙️  Loading configuration...");
    let project = Project::load(&project_dir)?;
    println!("   Project: {}", project.config.name);

    let catalog = match load_rule_catalog(&project.rules) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("\n💥 INVALID RULE CATALOG: {}", e);
            std::process::exit(1);
        }
    };
    println!(
        "📚 {} rules on {} entities",
        catalog.rule_count(),
        catalog.entities().count()
    );

    // B. Storage (fatal when unavailable)
    let store = match DuckDBStore::open(&project.database) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("\n💥 STORAGE UNAVAILABLE: {}", e);
            std::process::exit(1);
        }
    };
    store
        .ensure_audit_log()
        .await
        .with_context(|| format!("Failed to prepare the audit log in {}", project.database))?;

    // C. Detection (Application Layer)
    let options = DetectionOptions {
        run_id,
        only_entity: entity,
        ..DetectionOptions::from_config(&project.config.detection)
    };

    match run_detection(&catalog, &store, &store, &options).await {
        Ok(report) => {
            print_report(&report);
            println!(
                "\n✨ Detection finished in {:.2?}: {} findings, {} skipped rules, {} errors",
                start.elapsed(),
                report.finding_count(),
                report.skipped_count(),
                report.error_count()
            );
        }
        Err(PipewatchError::Domain(e)) if e.is_fatal() => {
            eprintln!("\n💥 {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("\n💥 CRITICAL DETECTION ERROR: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    println!("🔎 Run {}", report.run_id);

    for entity in &report.entities {
        match entity.outcome {
            EntityOutcome::Evaluated if entity.findings.is_empty() => {
                println!("  ✅ {}: no findings", entity.entity)
            }
            EntityOutcome::Evaluated => {
                println!("  🔹 {}: {} findings", entity.entity, entity.findings.len())
            }
            EntityOutcome::Absent => println!("  ⏭️  {}: table not loaded yet", entity.entity),
            EntityOutcome::TimedOut => println!("  ⏱️  {}: timed out", entity.entity),
            EntityOutcome::NotMonitored => println!("  ➖ {}: no rules", entity.entity),
            EntityOutcome::Failed => println!("  ❌ {}: failed", entity.entity),
        }

        for finding in &entity.findings {
            let icon = match finding.severity {
                Severity::Critical => "🚨",
                Severity::Warning => "⚠️ ",
                Severity::Info => "💚",
            };
            println!(
                "     {} [{}] {} (metric {} / threshold {})",
                icon,
                finding.severity,
                finding.rule_name,
                finding.metric_value,
                finding.threshold_value
            );
        }
        for (rule, reason) in &entity.skipped {
            println!("     ⏭️  {} skipped: {}", rule, reason);
        }
        for error in &entity.errors {
            eprintln!("     ❌ {}", error);
        }
    }
}
