use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &Path) -> PathBuf {
    let toml = r#"
[motor]
port = "/dev/null"

[load_cell]
port = "/dev/null"

[sampling]
interval_ms = 0
"#;
    let path = dir.join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn json_run(dir: &Path) -> Command {
    let cfg = write_valid_config(dir);
    let mut cmd = Command::cargo_bin("freeloader").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("off")
        .arg("--sim")
        .arg("--config")
        .arg(&cfg)
        .arg("run")
        .arg("--output-dir")
        .arg(dir)
        .env("FREELOADER_SIM_STEP", "50")
        .env_remove("RUST_LOG");
    cmd
}

fn summary_line(stdout: &[u8]) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(stdout);
    let line = stdout
        .lines()
        .find(|l| l.contains("\"stop_reason\""))
        .unwrap_or_else(|| panic!("no summary line; stdout was: {stdout}"));
    serde_json::from_str(line).unwrap()
}

/// Validate the summary schema for a run that ends on a break.
#[rstest]
fn json_summary_schema() {
    let dir = tempdir().unwrap();
    let out = json_run(dir.path()).assert().success().get_output().stdout.clone();
    let v = summary_line(&out);

    assert!(v["timestamp"].as_i64().unwrap() > 0);
    assert_eq!(v["stop_reason"], "sample_break");
    assert!(v["samples"].as_u64().unwrap() > 0);
    assert_eq!(v["skipped"], 0);
    assert!(v["peak_weight"].as_f64().unwrap() > 0.0);
    assert!(v["duration_ms"].is_u64());
    assert!(v["error"].is_null());
    let file = PathBuf::from(v["file"].as_str().unwrap());
    assert!(file.exists(), "summary names a missing file: {}", file.display());
}

#[rstest]
fn garbled_readings_are_counted_not_fatal() {
    let dir = tempdir().unwrap();
    let out = json_run(dir.path())
        .env("FREELOADER_SIM_GARBLE_EVERY", "4")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = summary_line(&out);
    assert!(v["skipped"].as_u64().unwrap() >= 1);
}

#[rstest]
fn link_loss_exits_with_communication_code() {
    let dir = tempdir().unwrap();
    let assert = json_run(dir.path())
        .env("FREELOADER_SIM_FAIL_AT", "3")
        .assert()
        .code(4);
    let output = assert.get_output();

    let v = summary_line(&output.stdout);
    assert_eq!(v["samples"], 3);
    assert!(v["stop_reason"].is_null());
    assert!(v["error"].as_str().unwrap().contains("no reply"));

    let stderr = String::from_utf8_lossy(&output.stderr);
    let err_line = stderr
        .lines()
        .find(|l| l.contains("\"reason\""))
        .unwrap_or_else(|| panic!("no JSON error; stderr was: {stderr}"));
    let e: serde_json::Value = serde_json::from_str(err_line).unwrap();
    assert_eq!(e["reason"], "Communication");
    assert_eq!(e["exit_code"], 4);

    // Samples taken before the failure stay on disk.
    let file = PathBuf::from(v["file"].as_str().unwrap());
    let text = fs::read_to_string(file).unwrap();
    let rows = text
        .lines()
        .skip_while(|l| !l.starts_with("Timestamp"))
        .skip(1)
        .count();
    assert_eq!(rows, 3);
}
