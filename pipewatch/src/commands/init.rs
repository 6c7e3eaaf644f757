// pipewatch/src/commands/init.rs
//
// USE CASE: Create the audit table.

use std::path::PathBuf;

use anyhow::Context;
use pipewatch_core::infrastructure::adapters::DuckDBStore;

use super::Project;

pub async fn execute(project_dir: PathBuf) -> anyhow::Result<()> {
    let project = Project::load(&project_dir)?;

    let store = DuckDBStore::open_or_create(&project.database)
        .with_context(|| format!("Failed to open DuckDB at {}", project.database))?;
    store.ensure_audit_log().await?;

    println!("🏗️  Audit log ready in {}", store.location());
    Ok(())
}
