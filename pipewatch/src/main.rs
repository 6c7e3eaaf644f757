// pipewatch/src/main.rs

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Setup Logging (Tracing)
    // Logs go to stderr, stdout carries the command output.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            project_dir,
            entity,
            run_id,
        } => commands::run::execute(project_dir, entity, run_id).await?,
        Commands::Init { project_dir } => commands::init::execute(project_dir).await?,
        Commands::Logs { project_dir, limit } => {
            commands::logs::execute(project_dir, limit).await?
        }
        Commands::Rules { project_dir } => commands::rules::execute(project_dir)?,
    }

    Ok(())
}
