use freeloader_config::{load_file, load_toml};
use rstest::rstest;
use std::fs;
use tempfile::tempdir;

const BASE: &str = r#"
[motor]
port = "COM3"
baud_rate = 57600
id = 1

[load_cell]
port = "COM2"
baud_rate = 9600

[motion]
speed = 10
target_position = 1020
home_position = 0
home_speed = 1023

[sampling]
interval_ms = 10

[safety]
max_force = 200.0
travel_limit = 1000
break_ratio = 0.1
break_floor = 0.5
"#;

fn with_override(section: &str, line: &str) -> String {
    let header = format!("[{section}]\n");
    BASE.replacen(&header, &format!("{header}{line}\n"), 1)
}

#[test]
fn accepts_full_config() {
    let cfg = load_toml(BASE).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.sampling.interval_ms, 10);
}

#[rstest]
#[case("safety", "max_force = 0.0", "max_force")]
#[case("safety", "break_ratio = 1.5", "break_ratio")]
#[case("safety", "travel_limit = -1", "travel_limit")]
#[case("motion", "speed = 0", "motion.speed")]
#[case("motion", "step_increment = 0", "step_increment")]
#[case("motor", "timeout_ms = 0", "timeout_ms")]
#[case("safety", "travel_limit = 2000", "motion.target_position")]
#[case("motion", "target_position = 500", "motion.target_position")]
fn rejects_out_of_range_values(
    #[case] section: &str,
    #[case] line: &str,
    #[case] needle: &str,
) {
    // The override is inserted first in the section, so later keys would
    // duplicate it; drop the original key from BASE when present.
    let key = line.split('=').next().unwrap().trim();
    let base: String = BASE
        .lines()
        .filter(|l| !l.trim_start().starts_with(&format!("{key} ")))
        .collect::<Vec<_>>()
        .join("\n");
    let header = format!("[{section}]\n");
    let toml = base.replacen(&header, &format!("{header}{line}\n"), 1);

    let cfg = load_toml(&toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "error {err} should mention {needle}"
    );
}

#[test]
fn rejects_unknown_rotation() {
    let toml = format!("{BASE}\n[logging]\nrotation = \"weekly\"\n");
    let cfg = load_toml(&toml).expect("parse TOML");
    assert!(cfg.validate().is_err());
}

#[test]
fn step_increment_is_optional() {
    let toml = with_override("motion", "step_increment = 4");
    let cfg = load_toml(&toml).expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.motion.step_increment, Some(4));
}

#[test]
fn load_file_reports_path_and_validation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rig.toml");
    fs::write(&path, BASE.replace("max_force = 200.0", "max_force = -1.0")).unwrap();
    let err = load_file(&path).unwrap_err();
    assert!(format!("{err}").contains("max_force"));

    let missing = dir.path().join("nope.toml");
    let err = load_file(&missing).unwrap_err();
    assert!(format!("{err}").contains("nope.toml"));
}

#[test]
fn travel_limit_may_equal_the_target() {
    let toml = BASE.replace("travel_limit = 1000", "travel_limit = 1020");
    let cfg = load_toml(&toml).expect("parse TOML");
    cfg.validate().expect("a limit at the target is reachable");
}
