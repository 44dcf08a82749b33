//! Integration tests for the `arc` CLI binary.

use assert_cmd::Command;
use predicates::str::contains;

fn arc() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("arc").expect("binary `arc` should be built")
}

#[test]
fn help_flag_prints_usage() {
    arc()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("Agentic Research Core CLI"))
        .stdout(contains("run-sync"))
        .stdout(contains("schema"));
}

#[test]
fn version_flag_prints_version() {
    arc().arg("--version").assert().success().stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn run_sync_completes_a_job_and_prints_json() {
    let output = arc()
        .args(["run-sync", "--address", "123 Main St", "--city", "Austin", "--state", "TX", "--zip", "78701"])
        .output()
        .expect("execute arc");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let job: serde_json::Value = serde_json::from_str(&stdout).expect("run-sync should print one JSON Job");
    assert_eq!(job["status"], "completed");
    assert!(job["results"].is_object() || job["results"].is_string());
}

#[test]
fn run_sync_with_orchestrated_extensive_agents_succeeds() {
    arc()
        .args([
            "run-sync",
            "--address",
            "456 Oak Ave",
            "--mode",
            "orchestrated",
            "--extra-agent",
            "extensive",
            "--max-steps",
            "25",
        ])
        .assert()
        .success();
}

#[test]
fn run_sync_missing_required_address_flag() {
    arc().args(["run-sync", "--city", "Austin"]).assert().failure().stderr(contains("--address"));
}

#[test]
fn unknown_subcommand_gives_error() {
    arc().arg("nonexistent").assert().failure().stderr(contains("unrecognized subcommand"));
}

#[test]
fn schema_subcommand_prints_json_schema() {
    arc().arg("schema").assert().success().stdout(contains("\"title\"")).stdout(contains("ResearchOutput"));
}

#[test]
fn enrichment_status_for_unknown_property_is_null() {
    arc().args(["enrichment-status", "--property-id", "999999"]).assert().success().stdout(contains("null"));
}

#[test]
fn debug_flag_is_accepted() {
    arc().args(["--debug", "run-sync", "--address", "789 Pine Rd"]).assert().success();
}
