//! Recommendation-related CLI commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, RecommendationList};
use crate::output::{color_priority, print_json, print_rows, truncate, OutputFormat};

/// Row for recommendations table
#[derive(Tabled)]
struct RecommendationRow {
    #[tabled(rename = "Finding")]
    finding_id: u64,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Action")]
    action: String,
}

/// Show one recommendation per active finding
pub async fn get_recommendations(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: RecommendationList = client.get("api/v1/recommendations", &[]).await?;

    match format {
        OutputFormat::Json => print_json(&result.recommendations)?,
        OutputFormat::Table => {
            let rows: Vec<RecommendationRow> = result
                .recommendations
                .iter()
                .map(|r| RecommendationRow {
                    finding_id: r.finding_id,
                    priority: color_priority(r.priority),
                    entity: r.entity.to_string(),
                    title: r.title.clone(),
                    action: truncate(&r.action, 70),
                })
                .collect();

            print_rows(rows, "No recommendations, nothing is currently flagged");

            // Commands are long; list them below the table instead of in a column
            if !result.recommendations.is_empty() {
                println!("\nDiagnostics:");
                for r in &result.recommendations {
                    println!("  #{}  {}", r.finding_id, r.diagnostic_command);
                }
            }
        }
    }

    Ok(())
}
