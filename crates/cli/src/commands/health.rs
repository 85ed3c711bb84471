//! Agent health

use anyhow::Result;
use insight_lib::health::{ComponentStatus, HealthResponse};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_status, format_time, print_error, print_info, print_json, print_rows, print_success,
    print_warning, OutputFormat,
};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Since")]
    since: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show overall and per-component health of the agent
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.get("healthz", &[]).await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            let rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    name: name.clone(),
                    status: color_status(component.status),
                    since: format_time(&component.since),
                    message: component.message.clone().unwrap_or_default(),
                })
                .collect();
            print_rows(rows, "Agent reported no components");

            println!();
            match health.last_cycle_at {
                Some(at) => print_info(&format!(
                    "{} cycles completed, last at {}",
                    health.cycles_completed,
                    format_time(&at)
                )),
                None => print_warning("No evaluation cycle has completed yet"),
            }
            match health.status {
                ComponentStatus::Healthy => print_success("Agent is healthy"),
                ComponentStatus::Degraded => print_warning("Agent is degraded but operational"),
                ComponentStatus::Unhealthy => print_error("Agent is unhealthy"),
            }
        }
    }

    Ok(())
}
