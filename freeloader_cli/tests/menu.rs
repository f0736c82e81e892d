use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use assert_cmd::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &Path) -> PathBuf {
    let toml = r#"
[motor]
port = "/dev/null"

[load_cell]
port = "/dev/null"
settle_ms = 0

[sampling]
interval_ms = 0
"#;
    let path = dir.join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn menu(cfg: &Path) -> Command {
    let mut cmd = Command::cargo_bin("freeloader").unwrap();
    cmd.arg("--config")
        .arg(cfg)
        .arg("--sim")
        .arg("--log-level")
        .arg("off")
        .arg("menu")
        .env("FREELOADER_SIM_STEP", "50")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn tare_run_and_exit() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(dir.path());
    let out = dir.path().join("runs");
    let script = format!("2\n1\n{}\n3\n", out.display());

    menu(&cfg)
        .write_stdin(script)
        .assert()
        .success()
        .stdout(predicate::str::contains("Motor and load cell connected."))
        .stdout(predicate::str::contains("Load cell tared."))
        .stdout(predicate::str::contains("Run finished"))
        .stdout(predicate::str::contains("Closing the program..."));

    let files: Vec<_> = fs::read_dir(&out).unwrap().collect();
    assert_eq!(files.len(), 1);
}

#[test]
fn two_runs_in_one_session_write_two_files() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(dir.path());
    let out = dir.path().join("runs");
    let d = out.display();
    let script = format!("1\n{d}\n1\n{d}\nq\n");

    menu(&cfg).write_stdin(script).assert().success();

    let files: Vec<_> = fs::read_dir(&out).unwrap().collect();
    assert_eq!(files.len(), 2, "second run must not overwrite the first");
}

#[test]
fn invalid_choice_reprompts() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(dir.path());

    menu(&cfg)
        .write_stdin("7\nexit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Invalid choice \"7\". Please try again."))
        .stdout(predicate::str::contains("Closing the program..."));
}

#[test]
fn end_of_input_closes_cleanly() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(dir.path());

    menu(&cfg)
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::contains("Closing the program..."));
}

#[test]
fn jog_moves_the_motor_and_returns_to_the_menu() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(dir.path());

    menu(&cfg)
        .write_stdin("4\n300\n4\nfar\n3\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("4. Jog motor"))
        .stdout(predicate::str::contains("Motor at position 300"))
        .stdout(predicate::str::contains("Invalid position \"far\"."))
        .stdout(predicate::str::contains("Closing the program..."));
}
