//! Integration tests for the `vigil ingest` and `vigil models` commands.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `vigil` running in `dir` against a database file inside it.
fn vigil(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("vigil").unwrap();
    cmd.current_dir(dir.path())
        .env("VIGIL__DATABASE__PATH", dir.path().join("vigil.db"))
        .env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_ingest_creates_then_accumulates() {
    let dir = TempDir::new().unwrap();

    vigil(&dir)
        .args(["ingest", "alice", "face_model", "120"])
        .assert()
        .success()
        .stdout(predicate::str::contains("alice/face_model: 120 features (120 unused), not_train"));

    vigil(&dir)
        .args(["ingest", "alice", "face_model", "25"])
        .assert()
        .success()
        .stdout(predicate::str::contains("145 features"));
}

#[test]
fn test_models_json_lists_records() {
    let dir = TempDir::new().unwrap();
    vigil(&dir).args(["ingest", "alice", "face_model", "7"]).assert().success();

    let output = vigil(&dir).args(["models", "alice", "--json"]).output().unwrap();
    assert!(output.status.success());

    let models: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(models[0]["model_type"], "face_model");
    assert_eq!(models[0]["features_count"], 7);
    assert_eq!(models[0]["features_count_used"], 0);
    assert_eq!(models[0]["train_status"], "not_train");
    assert!(models[0]["artifact_key"].is_null());
}

#[test]
fn test_models_for_unknown_user() {
    let dir = TempDir::new().unwrap();

    vigil(&dir)
        .args(["models", "nobody"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No models for nobody"));
}

#[test]
fn test_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();

    vigil(&dir)
        .args(["--config", "missing.toml", "models", "alice"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load settings"));
}

#[test]
fn test_config_file_in_working_directory_is_used() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("vigil.toml"), "[trainer]\ncron = \"not a schedule\"\n").unwrap();

    vigil(&dir)
        .args(["models", "alice"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid schedule"));
}

#[test]
fn test_init_queues_requires_thresholds_file() {
    let dir = TempDir::new().unwrap();

    vigil(&dir)
        .args(["init-queues"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load thresholds"));
}
