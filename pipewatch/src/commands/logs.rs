// pipewatch/src/commands/logs.rs
//
// USE CASE: Show the most recent findings.

use std::path::PathBuf;

use anyhow::Context;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use pipewatch_core::application::recent_findings;
use pipewatch_core::domain::rules::Severity;
use pipewatch_core::infrastructure::adapters::DuckDBStore;

use super::Project;

pub async fn execute(project_dir: PathBuf, limit: usize) -> anyhow::Result<()> {
    let project = Project::load(&project_dir)?;

    let store = DuckDBStore::open(&project.database)
        .with_context(|| format!("Failed to open DuckDB at {}", project.database))?;
    let findings = recent_findings(&store, limit)
        .await
        .context("Failed to read the audit log (did you run 'pipewatch init'?)")?;

    if findings.is_empty() {
        println!("📭 No findings recorded yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "ID", "Time", "Table", "Category", "Check", "Severity", "Metric", "Threshold",
        ]);

    for finding in &findings {
        let color = match finding.severity {
            Severity::Critical => Color::Red,
            Severity::Warning => Color::Yellow,
            Severity::Info => Color::Green,
        };
        table.add_row(vec![
            Cell::new(finding.sequence_id),
            Cell::new(finding.event_time.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(&finding.entity),
            Cell::new(finding.category),
            Cell::new(&finding.rule_name),
            Cell::new(finding.severity).fg(color),
            Cell::new(finding.metric_value),
            Cell::new(finding.threshold_value),
        ]);
    }

    println!("📜 Last {} findings", findings.len());
    println!("{table}");
    Ok(())
}
