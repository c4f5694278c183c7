//! CLI module for the workflow builder
//!
//! - `serve`: run the HTTP API (default deployment)
//! - `check-config`: load and validate configuration, then print the effective limits

pub mod check_config;
pub mod serve;

use clap::{Parser, Subcommand};

/// Workflow Builder - session-scoped construction of orchestrator workflows
#[derive(Parser)]
#[command(name = "workflow-builder")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the builder API server
    Serve,

    /// Validate configuration and print the effective builder limits
    CheckConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["workflow-builder", "serve"]).unwrap();
        assert!(matches!(cli.command, Command::Serve));

        let cli = Cli::try_parse_from(["workflow-builder", "check-config"]).unwrap();
        assert!(matches!(cli.command, Command::CheckConfig));

        assert!(Cli::try_parse_from(["workflow-builder", "ui"]).is_err());
    }
}
