use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("gymbridge").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "gymbridge - drive RL agents from turn-based simulations",
        ));
}

#[test]
fn test_cli_list() {
    let mut cmd = Command::cargo_bin("gymbridge").unwrap();
    cmd.arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Available simulations:"))
        .stdout(predicate::str::contains("cartpole"))
        .stdout(predicate::str::contains("grid-nav"));
}

#[test]
fn test_cli_demo_bandit() {
    let mut cmd = Command::cargo_bin("gymbridge").unwrap();
    cmd.arg("demo")
        .arg("bandit")
        .arg("--episodes")
        .arg("3")
        .assert()
        .success()
        .stdout(predicate::str::contains("Demo complete: 3 episodes"));
}

#[test]
fn test_cli_demo_grid_nav() {
    let mut cmd = Command::cargo_bin("gymbridge").unwrap();
    cmd.arg("demo")
        .arg("grid-nav")
        .arg("--episodes")
        .arg("1")
        .arg("--seed")
        .arg("7")
        .assert()
        .success()
        .stdout(predicate::str::contains("Demo complete: 1 episodes"));
}

#[test]
fn test_cli_demo_unknown_sim() {
    let mut cmd = Command::cargo_bin("gymbridge").unwrap();
    cmd.arg("demo")
        .arg("pong")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown simulation"));
}

#[test]
fn test_cli_agent_rejects_bad_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{{\"port\": \"not a number\"}}").unwrap();

    let mut cmd = Command::cargo_bin("gymbridge").unwrap();
    cmd.arg("agent")
        .arg("--config")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("parsing"));
}

#[test]
fn test_cli_agent_times_out_without_simulation() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{{\"timeout_secs\": 0.2}}").unwrap();

    let mut cmd = Command::cargo_bin("gymbridge").unwrap();
    cmd.arg("agent")
        .arg("--config")
        .arg(file.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("Listening on 127.0.0.1:"))
        .stderr(predicate::str::contains("Timed out"));
}
