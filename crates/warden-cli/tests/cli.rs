//! Integration tests for the `warden` binary.
//!
//! Run with: cargo test --package warden --test cli

use std::io::Write;
use std::process::{Command, Output};

use tempfile::NamedTempFile;

const CATALOG: &str = r#"{
    "databases": [{
        "type": "postgres",
        "connectionName": "bank",
        "host": "localhost",
        "port": 5432,
        "username": "agent",
        "database": "bank",
        "columnPolicy": {"pseudonymize": {"randomized": ["users.fiscal_code"]}}
    }]
}"#;

fn write_catalog(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn warden(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_warden"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("WARDEN_CONFIG")
        .output()
        .unwrap()
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

/// `check` prints one block per connection.
#[test]
fn test_check_prints_profiles() {
    let file = write_catalog(CATALOG);
    let output = warden(&["check", "--config", file.path().to_str().unwrap()]);

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("• bank (postgres)"));
    assert!(stdout.contains("users.fiscal_code"));
}

/// `check` fails on an invalid catalog.
#[test]
fn test_check_rejects_invalid_catalog() {
    let file = write_catalog(r#"{"databases": [], "extra": true}"#);
    let output = warden(&["check", "--config", file.path().to_str().unwrap()]);
    assert!(!output.status.success());
}

/// An accepted statement exits with success and prints its plan.
#[test]
fn test_validate_accepts() {
    let file = write_catalog(CATALOG);
    let output = warden(&[
        "validate",
        "--config",
        file.path().to_str().unwrap(),
        "--connection",
        "bank",
        "--vault",
        "open",
        "SELECT u.fiscal_code FROM users u WHERE u.id = 1 LIMIT 5",
    ]);

    assert!(output.status.success());
    let verdict = stdout_json(&output);
    assert_eq!(verdict["ok"], true);
    assert_eq!(verdict["columns"][0]["column_id"], "users.fiscal_code");
}

/// A rejected statement exits with failure and still prints a verdict.
#[test]
fn test_validate_rejects() {
    let file = write_catalog(CATALOG);
    let output = warden(&[
        "validate",
        "--config",
        file.path().to_str().unwrap(),
        "--connection",
        "bank",
        "SELECT * FROM users u",
    ]);

    assert!(!output.status.success());
    let verdict = stdout_json(&output);
    assert_eq!(verdict["ok"], false);
    assert_eq!(verdict["code"], "star");
}

/// The vault defaults to closed.
#[test]
fn test_validate_defaults_to_closed_vault() {
    let file = write_catalog(CATALOG);
    let output = warden(&[
        "validate",
        "--config",
        file.path().to_str().unwrap(),
        "--connection",
        "bank",
        "SELECT u.fiscal_code FROM users u LIMIT 5",
    ]);

    assert!(!output.status.success());
    assert_eq!(stdout_json(&output)["code"], "vault_closed");
}

/// An unknown connection is an error, not a verdict.
#[test]
fn test_validate_unknown_connection() {
    let file = write_catalog(CATALOG);
    let output = warden(&[
        "validate",
        "--config",
        file.path().to_str().unwrap(),
        "--connection",
        "missing",
        "SELECT 1",
    ]);

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown connection 'missing'"));
}
