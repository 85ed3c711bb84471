//! CLI integration tests

use std::process::{Command, Output};

fn insight(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_insight"))
        .args(args)
        .env_remove("INSIGHT_API_URL")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = insight(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Cluster Insight"), "Should show app name");
    assert!(stdout.contains("findings"), "Should show findings command");
    assert!(stdout.contains("activity"), "Should show activity command");
    assert!(
        stdout.contains("recommendations"),
        "Should show recommendations command"
    );
    assert!(stdout.contains("health"), "Should show health command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = insight(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("insight"), "Should show binary name");
}

#[test]
fn test_findings_help() {
    let output = insight(&["findings", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Findings help should succeed");
    assert!(stdout.contains("--entity"), "Should show entity option");
    assert!(stdout.contains("--severity"), "Should show severity option");
}

#[test]
fn test_activity_help() {
    let output = insight(&["activity", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Activity help should succeed");
    assert!(stdout.contains("--since"), "Should show since option");
}

/// Test format option
#[test]
fn test_format_option() {
    let output = insight(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--format"), "Should show format option");
    assert!(stdout.contains("table"), "Should show table format");
    assert!(stdout.contains("json"), "Should show json format");
}

/// Test api-url option
#[test]
fn test_api_url_option() {
    let output = insight(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("INSIGHT_API_URL"), "Should show env var");
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let output = insight(&["invalid-command"]);
    assert!(!output.status.success(), "Invalid command should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error") || stderr.contains("invalid"),
        "Should show error message"
    );
}

#[test]
fn test_invalid_severity_rejected() {
    let output = insight(&["findings", "--severity", "urgent"]);
    assert!(!output.status.success(), "Unknown severity should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("urgent"), "Should echo the bad value");
}

#[test]
fn test_invalid_since_rejected() {
    let output = insight(&["activity", "--since", "10w"]);
    assert!(!output.status.success(), "Unknown unit should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unit"), "Should explain the unit error");
}

#[test]
fn test_unreachable_agent_fails() {
    // Port 9 (discard) on localhost is not expected to run an HTTP server
    let output = insight(&["--api-url", "http://127.0.0.1:9", "health"]);
    assert!(!output.status.success(), "Request to a dead agent should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to send request"));
}
