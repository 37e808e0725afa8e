//! Tests for the `repo-runner` binary's argument handling.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("repo-runner")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("doctor"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("runner.toml");
    std::fs::write(&config, "[backend]\nport = 8002\n").unwrap();

    Command::cargo_bin("repo-runner")
        .unwrap()
        .args(["doctor", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("8002"));
}

#[test]
fn test_unparseable_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("runner.toml");
    std::fs::write(&config, "[backend\nport = ").unwrap();

    Command::cargo_bin("repo-runner")
        .unwrap()
        .arg("serve")
        .env("REPO_RUNNER_CONFIG", &config)
        .assert()
        .failure();
}
