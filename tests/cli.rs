// ABOUTME: Integration tests for the waypoint CLI commands.
// ABOUTME: Validates --help output, job ordering and simulation runs.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn waypoint_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("waypoint"))
}

fn write_spec(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("deployment.yml");
    fs::write(
        &path,
        r#"
instances:
  - steps:
      - test
      - staging
      - prod: us-east-1
      - delay: 1h
      - prod: us-west-1
"#,
    )
    .unwrap();
    path
}

#[test]
fn help_shows_commands() {
    waypoint_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("order"))
        .stdout(predicate::str::contains("simulate"));
}

#[test]
fn order_lists_jobs_with_delays() {
    let temp_dir = tempfile::tempdir().unwrap();
    let spec = write_spec(temp_dir.path());

    waypoint_cmd()
        .arg("order")
        .arg(&spec)
        .assert()
        .success()
        .stdout(predicate::str::contains("default:"))
        .stdout(predicate::str::contains("system-test"))
        .stdout(predicate::str::contains("production-us-east-1 (then wait 1h)"))
        .stdout(predicate::str::contains("production-us-west-1"));
}

#[test]
fn order_prints_json_lines() {
    let temp_dir = tempfile::tempdir().unwrap();
    let spec = write_spec(temp_dir.path());

    let output = waypoint_cmd()
        .arg("--json")
        .arg("order")
        .arg(&spec)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let records: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 4);
    assert_eq!(records[0]["data"]["job"], "system-test");
    assert_eq!(records[2]["data"]["delay_after_secs"], 3600);
}

#[test]
fn order_fails_on_missing_spec() {
    waypoint_cmd()
        .arg("order")
        .arg("does-not-exist.yml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn simulate_reports_triggered_jobs() {
    let temp_dir = tempfile::tempdir().unwrap();
    let spec = write_spec(temp_dir.path());

    waypoint_cmd()
        .current_dir(temp_dir.path())
        .arg("simulate")
        .arg(&spec)
        .args(["--passes", "6"])
        .assert()
        .success()
        .stdout(predicate::str::contains("submitted build 1 of local.application"))
        .stdout(predicate::str::contains("triggered system-test"))
        .stdout(predicate::str::contains("simulated 6 passes"));
}

#[test]
fn simulate_uses_discovered_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let spec = write_spec(temp_dir.path());
    fs::write(temp_dir.path().join("waypoint.yml"), "trigger_workers: 0").unwrap();

    waypoint_cmd()
        .current_dir(temp_dir.path())
        .arg("simulate")
        .arg(&spec)
        .assert()
        .failure()
        .stderr(predicate::str::contains("trigger_workers"));
}
