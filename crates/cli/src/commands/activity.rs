//! Activity log

use anyhow::Result;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use insight_lib::anomaly::ActivityEntry;
use tabled::Tabled;

use crate::client::{ActivityList, ApiClient};
use crate::output::{color_severity, format_time, print_info, print_json, print_rows, OutputFormat};

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ParseSinceError {
    #[error("empty time bound")]
    Empty,

    #[error("invalid duration '{0}' (expected e.g. 30m, 2h, 1d)")]
    InvalidDuration(String),

    #[error("unknown unit '{unit}' in '{input}' (use s, m, h or d)")]
    UnknownUnit { input: String, unit: char },

    #[error("'{0}' is neither a duration nor an RFC 3339 timestamp")]
    Unrecognized(String),
}

/// Parse `--since` as a relative duration (`45s`, `30m`, `2h`, `1d`) before
/// `now`, or as an absolute RFC 3339 timestamp
pub fn parse_since(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ParseSinceError> {
    let input = input.trim();
    let Some(unit) = input.chars().last() else {
        return Err(ParseSinceError::Empty);
    };

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(input) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    let digits = &input[..input.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(if unit.is_ascii_alphabetic() && digits.chars().all(|c| c.is_ascii_digit()) {
            ParseSinceError::InvalidDuration(input.to_string())
        } else {
            ParseSinceError::Unrecognized(input.to_string())
        });
    }
    let amount: i64 = digits
        .parse()
        .map_err(|_| ParseSinceError::InvalidDuration(input.to_string()))?;

    let span = match unit {
        's' => Duration::try_seconds(amount),
        'm' => Duration::try_minutes(amount),
        'h' => Duration::try_hours(amount),
        'd' => Duration::try_days(amount),
        other => {
            return Err(ParseSinceError::UnknownUnit {
                input: input.to_string(),
                unit: other,
            })
        }
    }
    .ok_or_else(|| ParseSinceError::InvalidDuration(input.to_string()))?;

    now.checked_sub_signed(span)
        .ok_or_else(|| ParseSinceError::InvalidDuration(input.to_string()))
}

/// clap value parser for `--since`, relative to the current time
pub fn since_arg(input: &str) -> Result<DateTime<Utc>, ParseSinceError> {
    parse_since(input, Utc::now())
}

#[derive(Tabled)]
struct ActivityRow {
    #[tabled(rename = "#")]
    sequence: u64,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&ActivityEntry> for ActivityRow {
    fn from(entry: &ActivityEntry) -> Self {
        Self {
            sequence: entry.sequence,
            time: format_time(&entry.timestamp),
            action: entry.action.to_string(),
            severity: entry.severity.map(color_severity).unwrap_or_default(),
            entity: entry
                .entity
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "-".to_string()),
            description: entry.description.clone(),
        }
    }
}

/// Show activity log entries, oldest first
pub async fn show_activity(
    client: &ApiClient,
    since: Option<DateTime<Utc>>,
    format: OutputFormat,
) -> Result<()> {
    let since_param = since
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default();
    let result: ActivityList = client
        .get("api/v1/activity", &[("since", since_param)])
        .await?;

    match format {
        OutputFormat::Json => print_json(&result.entries)?,
        OutputFormat::Table => {
            if let Some(since) = since {
                print_info(&format!("Activity since {}", format_time(&since)));
            }
            let rows: Vec<ActivityRow> = result.entries.iter().map(ActivityRow::from).collect();
            print_rows(rows, "No activity recorded");
        }
    }

    Ok(())
}
