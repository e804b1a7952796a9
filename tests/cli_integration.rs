//! Integration tests for the TAITI CLI

use assert_cmd::cargo;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the taiti binary
fn taiti() -> Command {
    Command::new(cargo::cargo_bin!("taiti"))
}

#[test]
fn test_help() {
    taiti()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("merge conflicts"));
}

#[test]
fn test_version() {
    taiti()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_check_reports_skipped_tokens() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("scenarios.csv");
    std::fs::write(
        &file,
        "features/login.feature,[3, abc, 7]\nfeatures/cart.feature,[12]\n",
    )
    .unwrap();

    taiti()
        .arg("--project")
        .arg(temp.path())
        .arg("check")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("features/login.feature [3, 7]"))
        .stdout(predicate::str::contains("abc"))
        .stdout(predicate::str::contains("3 reference(s) in 2 file(s), 1 skipped"));
}

#[test]
fn test_check_missing_file_fails() {
    let temp = TempDir::new().unwrap();

    taiti()
        .arg("--project")
        .arg(temp.path())
        .arg("check")
        .arg(temp.path().join("nope.csv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_init_writes_default_settings() {
    let temp = TempDir::new().unwrap();

    taiti()
        .arg("--project")
        .arg(temp.path())
        .arg("init")
        .arg("--board")
        .arg("https://trello.com/b/AbC123xy/sprint")
        .assert()
        .success()
        .stdout(predicate::str::contains("settings.json"));

    let settings = std::fs::read_to_string(temp.path().join(".taiti/settings.json")).unwrap();
    assert!(settings.contains("AbC123xy"));
    assert!(settings.contains("featuresDir"));

    // A second init refuses to overwrite
    taiti()
        .arg("--project")
        .arg(temp.path())
        .arg("init")
        .assert()
        .code(7)
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn test_refresh_without_credentials_is_config_error() {
    let temp = TempDir::new().unwrap();

    taiti()
        .arg("--project")
        .arg(temp.path())
        .arg("refresh")
        .env_remove("TAITI_TRELLO_KEY")
        .env_remove("TAITI_TRELLO_TOKEN")
        .env_remove("TAITI_BOARD")
        .assert()
        .code(7)
        .stderr(predicate::str::contains("tracker.board"));
}

#[test]
fn test_invalid_bucket_config_is_rejected() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join(".taiti")).unwrap();
    std::fs::write(
        temp.path().join(".taiti/settings.json"),
        r#"{ "buckets": { "unstarted": ["TODO"], "started": ["todo"] } }"#,
    )
    .unwrap();

    taiti()
        .arg("--project")
        .arg(temp.path())
        .arg("status")
        .assert()
        .code(7)
        .stderr(predicate::str::contains("both unstarted and started"));
}

#[test]
fn test_nonexistent_project_dir() {
    taiti()
        .arg("--project")
        .arg("/nonexistent/path/12345")
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}
