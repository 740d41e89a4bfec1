//! Command-line tests for the `st` binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `st` with its store, config and log locations inside `temp`
fn st(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("st").expect("st binary");
    cmd.current_dir(temp.path())
        .env("XDG_DATA_HOME", temp.path().join("data"))
        .env("XDG_CONFIG_HOME", temp.path().join("config"))
        .arg("--dir")
        .arg(temp.path().join("slots"));
    cmd
}

fn claim(temp: &TempDir, id: &str) {
    let slots = temp.path().join("slots");
    std::fs::create_dir_all(&slots).unwrap();
    std::fs::write(slots.join("active_instance.slot"), id).unwrap();
}

#[test]
fn test_status_without_owner() {
    let temp = TempDir::new().unwrap();
    st(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("none"));
}

#[test]
fn test_status_shows_owner() {
    let temp = TempDir::new().unwrap();
    claim(&temp, "stale-instance");
    st(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("stale-instance"));
}

#[test]
fn test_release_requires_matching_id() {
    let temp = TempDir::new().unwrap();
    claim(&temp, "stale-instance");

    st(&temp)
        .args(["release", "someone-else"])
        .assert()
        .success()
        .stdout(predicate::str::contains("left unchanged"));
    st(&temp)
        .args(["release", "stale-instance"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Released"));
    st(&temp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("none"));
}

#[test]
fn test_run_claims_and_releases_on_quit() {
    let temp = TempDir::new().unwrap();
    st(&temp)
        .arg("run")
        .write_stdin("quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Released slot"));
    assert!(!temp.path().join("slots").join("active_instance.slot").exists());
}

#[test]
fn test_run_takes_over_stale_claim_and_releases_on_eof() {
    let temp = TempDir::new().unwrap();
    claim(&temp, "old-instance");
    st(&temp).arg("run").write_stdin("").assert().success();

    // Took over on start, then released its own claim
    assert!(!temp.path().join("slots").join("active_instance.slot").exists());
}

#[test]
fn test_run_without_transfer_leaves_holder() {
    let temp = TempDir::new().unwrap();
    claim(&temp, "old-instance");
    st(&temp)
        .args(["run", "--no-transfer"])
        .write_stdin("quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("left unchanged"));

    let holder = std::fs::read_to_string(temp.path().join("slots").join("active_instance.slot")).unwrap();
    assert_eq!(holder, "old-instance");
}

#[test]
fn test_bad_config_path_fails() {
    let temp = TempDir::new().unwrap();
    st(&temp)
        .args(["--config", "missing.yml", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}
