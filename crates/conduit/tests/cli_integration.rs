//! CLI integration tests for the Conduit command-line interface.
//!
//! These tests do not need an MCP server or an LLM: they cover argument
//! parsing, help output and failure reporting.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the conduit binary, isolated from the user's config.
fn conduit(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("conduit").unwrap();
    cmd.env("CONDUIT_CONFIG_DIR", config_dir.path())
        .env_remove("CONDUIT_SERVER_URL")
        .current_dir(config_dir.path());
    cmd
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    conduit(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("MCP client"))
        .stdout(predicate::str::contains("tools"))
        .stdout(predicate::str::contains("call"))
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("chat"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    conduit(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("conduit"));
}

#[test]
fn test_call_help_shows_args_flag() {
    let dir = TempDir::new().unwrap();
    conduit(&dir)
        .args(["call", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--args"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure Reporting
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_ask_requires_prompt() {
    let dir = TempDir::new().unwrap();
    conduit(&dir).arg("ask").assert().failure();
}

#[test]
fn test_unknown_subcommand_fails() {
    let dir = TempDir::new().unwrap();
    conduit(&dir).arg("frobnicate").assert().failure();
}

#[test]
fn test_unreachable_server_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        "[server]\ntimeout_secs = 2\nretries = 0\n",
    )
    .unwrap();

    conduit(&dir)
        .args(["--server", "http://127.0.0.1:9/mcp", "tools"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to initialize MCP session"));
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.toml"), "[server]\ntimeout_secs = 0\n").unwrap();

    conduit(&dir)
        .arg("tools")
        .assert()
        .failure()
        .stderr(predicate::str::contains("server.timeout_secs"));
}
