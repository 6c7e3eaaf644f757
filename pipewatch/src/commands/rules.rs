// pipewatch/src/commands/rules.rs
//
// USE CASE: List the catalog in the order rules are checked.

use std::path::PathBuf;

use anyhow::Context;
use comfy_table::{ContentArrangement, Table, presets};
use pipewatch_core::domain::detection::plan_families;
use pipewatch_core::infrastructure::config::load_rule_catalog;

use super::Project;

pub fn execute(project_dir: PathBuf) -> anyhow::Result<()> {
    let project = Project::load(&project_dir)?;
    let catalog = load_rule_catalog(&project.rules)
        .with_context(|| format!("Invalid rule catalog at {:?}", project.rules))?;

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Entity", "Metric", "Order", "Rule", "Check", "Severity", "Threshold",
        ]);

    for entity in catalog.entities() {
        for family in plan_families(catalog.rules_for(entity)) {
            let metric = family.query.label();
            for (idx, rule) in family.rules.iter().enumerate() {
                table.add_row(vec![
                    entity.to_string(),
                    metric.clone(),
                    (idx + 1).to_string(),
                    rule.name.clone(),
                    rule.kind().to_string(),
                    rule.severity.to_string(),
                    rule.comparison.threshold_value().to_string(),
                ]);
            }
        }
    }

    println!("📋 {} rules", catalog.rule_count());
    println!("{table}");
    Ok(())
}
