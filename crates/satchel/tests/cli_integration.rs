//! CLI integration tests for the satchel command-line interface.
//!
//! These tests verify:
//! - Help text and argument parsing
//! - Reading and editing sessions in a SQLite store created by the library
//! - Errors for missing sessions and missing configuration

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use satchel_config::{ColumnDecl, ColumnKind, SessionConfig, SqlSection};
use satchel_session::{SessionModule, SqlStore};
use serde_json::json;
use tempfile::TempDir;

/// Get a command for the satchel binary, isolated from the user's config.
fn satchel(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("satchel").unwrap();
    cmd.current_dir(dir)
        .env("SATCHEL_CONFIG_DIR", dir.join("user-config"))
        .env_remove("SATCHEL_CONFIG");
    cmd
}

/// Write a project config pointing at `sessions.db` and seed one session.
fn seeded() -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("satchel.toml"),
        r#"
[session.sql]
path = "sessions.db"
columns = [{ name = "user_id", type = "integer" }]
"#,
    )
    .unwrap();

    let section = SqlSection {
        path: dir.path().join("sessions.db"),
        columns: vec![ColumnDecl::new("user_id", ColumnKind::Integer)],
        ..SqlSection::default()
    };
    let store = SqlStore::from_section(&section).unwrap();
    let config = SessionConfig {
        sql: Some(section),
        ..SessionConfig::default()
    };
    let module = SessionModule::new(config, None, Some(store)).unwrap();

    let mut session = module.create().unwrap();
    session.set("user_id", 7).unwrap();
    session.set("theme", "dark").unwrap();
    session.store().unwrap();
    let id = session.id().unwrap().to_string();
    (dir, id)
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    satchel(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("keys"))
        .stdout(predicate::str::contains("set"))
        .stdout(predicate::str::contains("delete"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    satchel(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("satchel"));
}

#[test]
fn test_set_requires_value() {
    let dir = TempDir::new().unwrap();
    satchel(dir.path())
        .args(["set", "some-id", "key"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("<VALUE>"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Commands
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_list_and_show() {
    let (dir, id) = seeded();

    satchel(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(id.as_str()));

    let output = satchel(dir.path())
        .args(["--json", "show", &id])
        .output()
        .unwrap();
    assert!(output.status.success());
    let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown, json!({"user_id": 7, "theme": "dark"}));
}

#[test]
fn test_keys_lists_columns_first() {
    let (dir, id) = seeded();
    satchel(dir.path())
        .args(["keys", &id])
        .assert()
        .success()
        .stdout(predicate::str::diff("user_id\ntheme\n"));
}

#[test]
fn test_set_and_delete_round_trip() {
    let (dir, id) = seeded();

    satchel(dir.path())
        .args(["set", &id, "cart", r#"{"items": [1, 2]}"#])
        .assert()
        .success();
    satchel(dir.path())
        .args(["delete", &id, "theme"])
        .assert()
        .success();

    let output = satchel(dir.path())
        .args(["--json", "show", &id])
        .output()
        .unwrap();
    let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(shown, json!({"user_id": 7, "cart": {"items": [1, 2]}}));
}

#[test]
fn test_set_rejects_mistyped_column() {
    let (dir, id) = seeded();
    satchel(dir.path())
        .args(["set", &id, "user_id", "seven"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("user_id"));
}

#[test]
fn test_unknown_session_fails() {
    let (dir, _) = seeded();
    satchel(dir.path())
        .args(["show", "no-such-session"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no session with id"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_sql_section_fails() {
    let dir = TempDir::new().unwrap();
    satchel(dir.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("[session.sql]"));
}

#[test]
fn test_config_prints_defaults() {
    let dir = TempDir::new().unwrap();
    satchel(dir.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("using defaults"))
        .stdout(predicate::str::contains("satchel.session"));
}

#[test]
fn test_explicit_config_file() {
    let (dir, id) = seeded();
    let config = dir.path().join("custom.toml");
    std::fs::rename(dir.path().join("satchel.toml"), &config).unwrap();

    satchel(dir.path())
        .arg("list")
        .assert()
        .failure();
    satchel(dir.path())
        .args(["--config", config.to_str().unwrap(), "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(id.as_str()));
    satchel(dir.path())
        .env("SATCHEL_CONFIG", &config)
        .arg("list")
        .assert()
        .success();
}
