//! Active findings

use anyhow::Result;
use insight_lib::models::{EntityRef, Severity};
use tabled::Tabled;

use crate::client::{ApiClient, FindingList};
use crate::output::{color_severity, format_time, print_json, print_rows, truncate, OutputFormat};

/// Row for findings table
#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "First Seen")]
    first_seen: String,
    #[tabled(rename = "Seen")]
    occurrences: u64,
}

/// List active findings, most severe first
pub async fn get_findings(
    client: &ApiClient,
    entity: Option<EntityRef>,
    severity: Option<Severity>,
    format: OutputFormat,
) -> Result<()> {
    let query = [
        ("entity", entity.map(|e| e.to_string()).unwrap_or_default()),
        ("severity", severity.map(|s| s.to_string()).unwrap_or_default()),
    ];
    let result: FindingList = client.get("api/v1/findings", &query).await?;

    match format {
        OutputFormat::Json => print_json(&result.findings)?,
        OutputFormat::Table => {
            let rows: Vec<FindingRow> = result
                .findings
                .iter()
                .map(|f| FindingRow {
                    id: f.id,
                    severity: color_severity(f.severity),
                    entity: f.entity.to_string(),
                    category: f.category.to_string(),
                    message: truncate(&f.message, 60),
                    first_seen: format_time(&f.first_seen),
                    occurrences: f.occurrences,
                })
                .collect();

            print_rows(rows, "No active findings");
            if result.count > 0 {
                println!("\nTotal: {} findings", result.count);
            }
        }
    }

    Ok(())
}
