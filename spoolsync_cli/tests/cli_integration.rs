use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn bin() -> Command {
    Command::cargo_bin("spoolsync_cli").expect("binary built")
}

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[staging]
ttl_secs = 300
block_secs = 5

[filter]
tolerance_g = 1.0
window_ms = 800
sample_rate_hz = 10

[assignment]
timeout_secs = 30

[presentation]
hold_ms = 4000
debounce_ms = 500

[timeouts]
sample_ms = 50

[hardware]
sensor_read_timeout_ms = 100
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[test]
fn help_names_the_daemon() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Spool staging"));
}

#[test]
fn simulate_prints_the_full_session() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    bin()
        .arg("--config")
        .arg(&cfg)
        .arg("simulate")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("staging started")
                .and(predicate::str::contains("reading unit 0 slot 2"))
                .and(predicate::str::contains("Success"))
                .and(predicate::str::contains("staging cleared")),
        );
}

#[test]
fn simulate_works_with_defaults_when_config_is_absent() {
    let dir = tempdir().unwrap();
    bin()
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .arg("simulate")
        .assert()
        .success();
}

#[test]
fn invalid_config_is_rejected_with_a_named_field() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[assignment]\ntimeout_secs = 0\n").unwrap();

    bin()
        .arg("--config")
        .arg(&path)
        .arg("simulate")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("timeout_secs"));
}

#[test]
fn self_check_passes_on_simulated_sources() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    bin()
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("self-check ok"));
}

#[test]
fn bad_calibration_csv_is_reported() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let cal = dir.path().join("cal.csv");
    fs::write(&cal, "counts,weight\n1,0.0\n").unwrap();

    bin()
        .arg("--config")
        .arg(&cfg)
        .arg("--calibration")
        .arg(&cal)
        .arg("simulate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("raw,grams"));
}

#[test]
fn run_terminates_after_the_requested_duration() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let mut cmd = assert_cmd::Command::cargo_bin("spoolsync_cli").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .arg("run")
        .arg("--duration-secs")
        .arg("1")
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .success();
}
