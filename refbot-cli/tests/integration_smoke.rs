//! Smoke tests to verify command wiring

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("refbot").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("migrate"));
}

#[test]
fn test_run_help() {
    let mut cmd = Command::cargo_bin("refbot").unwrap();
    cmd.arg("run").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Telegram Bot API token"));
}

#[test]
fn test_missing_database_url_fails() {
    let mut cmd = Command::cargo_bin("refbot").unwrap();
    cmd.env_remove("DATABASE_URL")
        .env_remove("BOT_TOKEN")
        .current_dir(std::env::temp_dir())
        .arg("migrate");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--database-url"));
}
