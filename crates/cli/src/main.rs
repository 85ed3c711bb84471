//! Cluster Insight CLI
//!
//! A command-line tool for querying findings, the activity log and
//! recommendations from a running insight agent.

mod client;
mod commands;
mod output;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use commands::{activity, findings, health, recommendations};
use insight_lib::models::{EntityRef, Severity};

/// Cluster Insight CLI
#[derive(Parser)]
#[command(name = "insight")]
#[command(author, version, about = "CLI for Cluster Insight anomaly detection", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via INSIGHT_API_URL env var)
    #[arg(long, env = "INSIGHT_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List active findings, most severe first
    Findings {
        /// Only findings for this entity (namespace/kind/name or node/name)
        #[arg(long, short)]
        entity: Option<EntityRef>,

        /// Only findings of this severity (info, warning, critical)
        #[arg(long, short)]
        severity: Option<Severity>,
    },

    /// Show the activity log
    Activity {
        /// Only entries at or after this point (e.g. 30m, 2h, 1d, or RFC 3339)
        #[arg(long, value_parser = activity::since_arg)]
        since: Option<DateTime<Utc>>,
    },

    /// Show recommendations for active findings
    Recommendations,

    /// Show agent health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize client
    let client = client::ApiClient::new(&cli.api_url)?;

    // Execute command
    match cli.command {
        Commands::Findings { entity, severity } => {
            findings::get_findings(&client, entity, severity, cli.format).await?;
        }
        Commands::Activity { since } => {
            activity::show_activity(&client, since, cli.format).await?;
        }
        Commands::Recommendations => {
            recommendations::get_recommendations(&client, cli.format).await?;
        }
        Commands::Health => {
            health::show_health(&client, cli.format).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_findings_filters_parse() {
        let cli = Cli::try_parse_from([
            "insight",
            "findings",
            "--entity",
            "default/pod/api-7f9",
            "--severity",
            "critical",
        ])
        .unwrap();

        match cli.command {
            Commands::Findings { entity, severity } => {
                assert_eq!(entity, Some(EntityRef::pod("default", "api-7f9")));
                assert_eq!(severity, Some(Severity::Critical));
            }
            _ => panic!("expected findings command"),
        }
    }

    #[test]
    fn test_bad_filters_rejected_before_any_request() {
        assert!(Cli::try_parse_from(["insight", "findings", "--severity", "urgent"]).is_err());
        assert!(Cli::try_parse_from(["insight", "findings", "--entity", "default/widget/x"]).is_err());
        assert!(Cli::try_parse_from(["insight", "activity", "--since", "yesterday"]).is_err());
    }

    #[test]
    fn test_json_format_flag() {
        let cli = Cli::try_parse_from(["insight", "--format", "json", "health"]).unwrap();
        assert!(matches!(cli.format, output::OutputFormat::Json));
        assert!(matches!(cli.command, Commands::Health));
    }
}
