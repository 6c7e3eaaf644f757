// pipewatch/src/cli.rs
//
// Single source of truth for all CLI definitions (Clap structs).

use clap::{Parser, Subcommand};
use pipewatch_core::application::DEFAULT_LOG_LIMIT;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pipewatch")]
#[command(about = "Rule-based anomaly detection for bronze ingestion tables", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 🔎 Runs a detection pass and records findings in the audit log
    Run {
        /// Project directory
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Evaluate only one entity (ex: "bronze_orders")
        #[arg(long, short)]
        entity: Option<String>,

        /// Run identifier stamped on every finding (default: random UUID)
        #[arg(long, env = "PIPEWATCH_RUN_ID")]
        run_id: Option<String>,
    },

    /// 🏗️  Creates the audit table (and the database file if missing)
    Init {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },

    /// 📜 Shows the most recent findings, newest first
    Logs {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Number of findings to display
        #[arg(long, short, default_value_t = DEFAULT_LOG_LIMIT)]
        limit: usize,
    },

    /// 📋 Lists the rule catalog in evaluation order
    Rules {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, bail};
    use clap::Parser;

    #[test]
    fn test_cli_parse_run_defaults() -> Result<()> {
        let args = Cli::parse_from(["pipewatch", "run"]);
        match args.command {
            Commands::Run {
                project_dir,
                entity,
                ..
            } => {
                assert_eq!(project_dir.to_string_lossy(), ".");
                assert_eq!(entity, None);
                Ok(())
            }
            _ => bail!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_entity() -> Result<()> {
        let args = Cli::parse_from([
            "pipewatch",
            "run",
            "--entity",
            "bronze_orders",
            "--project-dir",
            "/tmp",
            "--run-id",
            "nightly-42",
        ]);
        match args.command {
            Commands::Run {
                project_dir,
                entity,
                run_id,
            } => {
                assert_eq!(project_dir.to_string_lossy(), "/tmp");
                assert_eq!(entity, Some("bronze_orders".to_string()));
                assert_eq!(run_id, Some("nightly-42".to_string()));
                Ok(())
            }
            _ => bail!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_logs() -> Result<()> {
        let args = Cli::parse_from(["pipewatch", "logs", "--limit", "25"]);
        match args.command {
            Commands::Logs { limit, .. } => {
                assert_eq!(limit, 25);
                Ok(())
            }
            _ => bail!("Expected Logs command"),
        }
    }

    #[test]
    fn test_cli_parse_logs_default_limit() -> Result<()> {
        let args = Cli::parse_from(["pipewatch", "logs"]);
        match args.command {
            Commands::Logs { limit, .. } => {
                assert_eq!(limit, 10);
                Ok(())
            }
            _ => bail!("Expected Logs command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["pipewatch", "inject"]).is_err());
    }
}
