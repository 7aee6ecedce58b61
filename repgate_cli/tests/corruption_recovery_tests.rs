//! Corruption recovery tests for repgate.
//!
//! These tests verify the system can handle:
//! - Corrupted or inconsistent state files (rebuilt from the event log)
//! - Corrupted WAL files
//! - Partial writes
//! - Bad configuration

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::io::Write as IoWrite;
use std::path::Path;
use tempfile::TempDir;

fn repgate(data_dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("repgate"));
    cmd.env("XDG_CONFIG_HOME", data_dir.join("config"))
        .arg("--data-dir")
        .arg(data_dir);
    cmd
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn history_len(data_dir: &Path) -> usize {
    let output = repgate(data_dir).args(["history", "--json"]).output().unwrap();
    assert!(output.status.success());
    let events: Vec<Value> = serde_json::from_slice(&output.stdout).unwrap();
    events.len()
}

#[test]
fn test_corrupted_state_file_reads_as_zero() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    fs::create_dir_all(data_dir.join("ledger")).unwrap();
    fs::write(data_dir.join("ledger/state.json"), "{ invalid json }}}}")
        .expect("Failed to write corrupted state");

    // A damaged ledger never grants a request
    repgate(data_dir)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"decision\":\"block\""));

    // Next commit rewrites a valid state file
    repgate(data_dir).args(["grant", "1"]).assert().success();
    let state: Value =
        serde_json::from_str(&fs::read_to_string(data_dir.join("ledger/state.json")).unwrap())
            .expect("state.json should be valid again");
    assert_eq!(state["earned"], 1);
    assert_eq!(state["spent"], 0);
}

#[test]
fn test_corrupted_state_is_rebuilt_from_events() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    repgate(data_dir).args(["grant", "2"]).assert().success();
    repgate(data_dir).arg("check").assert().success();
    repgate(data_dir).arg("rollup").assert().success();
    repgate(data_dir).args(["grant", "1"]).assert().success();

    fs::write(data_dir.join("ledger/state.json"), "{ invalid json }}}}").unwrap();

    let output = repgate(data_dir).args(["balance", "--json"]).output().unwrap();
    assert!(output.status.success());
    let snapshot: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(snapshot["available"], 2);
    assert_eq!(snapshot["earned"], 3);
    assert_eq!(snapshot["spent"], 1);

    // The rebuilt balance still gates requests
    repgate(data_dir).arg("check").assert().success().stdout(predicate::str::is_empty());
}

#[test]
fn test_state_with_spent_above_earned_reads_as_zero() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    fs::create_dir_all(data_dir.join("ledger")).unwrap();
    fs::write(
        data_dir.join("ledger/state.json"),
        r#"{"earned": 1, "spent": 5}"#,
    )
    .unwrap();

    repgate(data_dir)
        .args(["balance", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"available\":0"));
}

#[test]
fn test_corrupted_wal_lines_are_skipped() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    fs::create_dir_all(data_dir.join("ledger")).unwrap();
    fs::write(
        data_dir.join("ledger/events.wal"),
        "{ invalid json }\n{ more invalid }\n",
    )
    .expect("Failed to write corrupted WAL");

    assert_eq!(history_len(data_dir), 0);

    // Appending after garbage still works
    repgate(data_dir).args(["grant", "2"]).assert().success();
    assert_eq!(history_len(data_dir), 1);
}

#[test]
fn test_partial_wal_line() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    repgate(data_dir).args(["grant", "1"]).assert().success();

    // Simulate a crash mid-write: a trailing line without newline
    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(data_dir.join("ledger/events.wal"))
        .unwrap();
    write!(file, r#"{{"id":"partial"#).unwrap();
    drop(file);

    assert_eq!(history_len(data_dir), 1);

    repgate(data_dir).arg("rollup").assert().success();
    assert_eq!(history_len(data_dir), 1);
}

#[test]
fn test_empty_files() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    fs::create_dir_all(data_dir.join("ledger")).unwrap();
    fs::write(data_dir.join("ledger/events.wal"), "").unwrap();
    fs::write(data_dir.join("ledger/state.json"), "").unwrap();

    repgate(data_dir)
        .args(["balance", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"available\":0"));

    repgate(data_dir).args(["credit", "--reps", "20"]).assert().success();
    repgate(data_dir).arg("check").assert().success().stdout(predicate::str::is_empty());
}

#[test]
fn test_corrupted_csv_rows_are_skipped() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    repgate(data_dir).args(["grant", "1"]).assert().success();
    repgate(data_dir).arg("rollup").assert().success();

    let mut csv = fs::OpenOptions::new()
        .append(true)
        .open(data_dir.join("events.csv"))
        .unwrap();
    writeln!(csv, "not-a-uuid,earn,1,yesterday,,").unwrap();
    drop(csv);

    assert_eq!(history_len(data_dir), 1);
}

#[test]
fn test_invalid_config_is_reported() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();
    let config_path = data_dir.join("bad.toml");
    fs::write(&config_path, "[detector]\nmin_visibility = 4.0\n").unwrap();

    repgate(data_dir)
        .arg("--config")
        .arg(&config_path)
        .arg("balance")
        .assert()
        .failure()
        .stderr(predicate::str::contains("min_visibility"));
}

#[test]
fn test_check_blocks_when_ledger_unusable() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    // A file where the ledger directory should be
    fs::write(data_dir.join("ledger"), "").unwrap();

    repgate(data_dir)
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Repgate error"));
}
