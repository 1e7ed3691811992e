//! CLI tests for `meshadapt plan` and `meshadapt run`.
//!
//! Spawns the binary and verifies exit codes for configuration and
//! missing-artifact failures, which are detected before any external tool
//! would run.

use std::process::Command;

use meshadapt::exit_codes;
use meshadapt::test_support::CaseDir;

const VALID: &str = r#"
[case]
mesh_filename = "mesh.su2"
mesh_out_filename = "mesh_adapted.su2"
restart_sol = false

[adaptation]
complexity = [1000.0, 4000.0]
sub_iterations = [2, 1]
sensor = "MACH_PRES"
"#;

fn meshadapt(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_meshadapt"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("spawn meshadapt")
}

#[test]
fn plan_prints_schedule() {
    let case = CaseDir::new(VALID).expect("case");
    let config = case.config_path();
    let output = meshadapt(&["plan", "--config", config.to_str().expect("utf-8 path")]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("sensor: MACH_PRES\n"));
    assert!(stdout.ends_with("total sub-iterations: 3\n"));
    assert!(!case.path().join("adap").exists());
}

#[test]
fn plan_with_unknown_sensor_exits_with_config_code() {
    let case = CaseDir::new(&VALID.replace("MACH_PRES", "VORTICITY")).expect("case");
    let config = case.config_path();
    let output = meshadapt(&["plan", "--config", config.to_str().expect("utf-8 path")]);

    assert_eq!(output.status.code(), Some(exit_codes::CONFIG));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown adaptation sensor 'VORTICITY'"));
}

#[test]
fn run_without_config_file_exits_with_config_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = temp.path().join("missing.toml");
    let output = meshadapt(&["run", "--config", missing.to_str().expect("utf-8 path")]);
    assert_eq!(output.status.code(), Some(exit_codes::CONFIG));
}

#[test]
fn run_with_missing_mesh_exits_with_missing_artifact_code() {
    let case = CaseDir::new(&VALID.replace("\"mesh.su2\"", "\"absent.su2\"")).expect("case");
    let config = case.config_path();
    let output = meshadapt(&["run", "--config", config.to_str().expect("utf-8 path")]);

    assert_eq!(output.status.code(), Some(exit_codes::MISSING_ARTIFACT));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("absent.su2"));
}
