//! Binary-level tests for the command line interface

use assert_cmd::Command;
use std::path::Path;
use tempfile::TempDir;

/// Binary with an empty environment, run from `dir` so no stray `.env` is picked up
fn exporter(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("spend-event-exporter").unwrap();
    cmd.env_clear().env("RUST_LOG", "error").current_dir(dir);
    cmd
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    let output = exporter(dir.path()).arg("--help").output().unwrap();

    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["export", "checkpoint", "validate"] {
        assert!(text.contains(command), "help should mention {command}: {text}");
    }
}

#[test]
fn test_validate_lists_every_missing_key() {
    let dir = TempDir::new().unwrap();
    let output = exporter(dir.path()).arg("validate").output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    let text = stderr(&output);
    for key in [
        "API_BASE_URL",
        "API_EVENTS_ENDPOINT",
        "API_KEY",
        "USER_TOKEN",
        "USER_EMAIL",
        "AZURE_STORAGE_CONNECTION_STRING",
        "AZURE_CONTAINER_NAME",
    ] {
        assert!(text.contains(key), "missing {key} in: {text}");
    }
}

#[test]
fn test_validate_reads_env_file() {
    let dir = TempDir::new().unwrap();
    let env_file = dir.path().join("export.env");
    std::fs::write(
        &env_file,
        "API_BASE_URL=https://api.example.com/v1\n\
         API_EVENTS_ENDPOINT=/events\n\
         API_KEY=key\n\
         USER_TOKEN=token\n\
         USER_EMAIL=ops@example.com\n\
         STORAGE_BACKEND=local\n\
         LOCAL_STORAGE_ROOT=./blobs\n",
    )
    .unwrap();

    let output = exporter(dir.path())
        .arg("--env-file")
        .arg(&env_file)
        .arg("validate")
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Configuration OK"));
}

#[test]
fn test_missing_env_file_fails() {
    let dir = TempDir::new().unwrap();
    let output = exporter(dir.path())
        .args(["--env-file", "does-not-exist.env", "validate"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_checkpoint_set_show_reset() {
    let dir = TempDir::new().unwrap();
    let progress = dir.path().join("progress.json");

    let output = exporter(dir.path())
        .env("PROGRESS_FILE", &progress)
        .args(["checkpoint", "set", "7"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&progress).unwrap()).unwrap();
    assert_eq!(saved["last_index"], 7);

    let output = exporter(dir.path())
        .env("PROGRESS_FILE", &progress)
        .args(["checkpoint", "show", "--output-format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("\"last_index\":7"));

    let output = exporter(dir.path())
        .env("PROGRESS_FILE", &progress)
        .args(["checkpoint", "reset"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&progress).unwrap()).unwrap();
    assert_eq!(saved["last_index"], 0);
}

#[test]
fn test_checkpoint_show_without_file() {
    let dir = TempDir::new().unwrap();
    let output = exporter(dir.path()).args(["checkpoint", "show"]).output().unwrap();

    assert!(output.status.success());
    assert!(stdout(&output).contains("next export starts at event 0"));
}

#[test]
fn test_export_without_configuration_fails() {
    let dir = TempDir::new().unwrap();
    let output = exporter(dir.path())
        .args(["export", "--no-progress"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(!dir.path().join("progress.json").exists());
}
