//! Grey-box tests over the real `spindb` binary. Everything here runs
//! against a throwaway `SPINDB_HOME` and sticks to file-based engines so
//! no server binaries are downloaded.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

fn spindb(home: &TempDir) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("spindb");
    cmd.env("SPINDB_HOME", home.path());
    cmd
}

#[test]
fn help_lists_the_lifecycle_commands() {
    let home = TempDir::new().unwrap();
    spindb(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("start"))
        .stdout(predicate::str::contains("doctor"))
        .stdout(predicate::str::contains("pull"));
}

#[test]
fn version_flag_works() {
    let home = TempDir::new().unwrap();
    spindb(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("spindb"));
}

#[test]
fn create_help_documents_the_flags() {
    let home = TempDir::new().unwrap();
    spindb(&home)
        .args(["create", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--engine"))
        .stdout(predicate::str::contains("--db-version"))
        .stdout(predicate::str::contains("--from-url"))
        .stdout(predicate::str::contains("--start"));
}

#[test]
fn list_on_a_fresh_home_is_empty() {
    let home = TempDir::new().unwrap();
    spindb(&home)
        .args(["--json", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn unknown_engine_fails_with_exit_code_one() {
    let home = TempDir::new().unwrap();
    spindb(&home)
        .args(["create", "x", "--engine", "oracle"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("oracle"));
}

#[test]
fn invalid_name_errors_in_json_mode() {
    let home = TempDir::new().unwrap();
    spindb(&home)
        .args(["--json", "create", "9lives", "--engine", "sqlite"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("INVALID_CONTAINER_NAME"));
}

#[test]
fn sqlite_lifecycle_round_trips() {
    let home = TempDir::new().unwrap();

    spindb(&home)
        .args(["--json", "create", "notes", "--engine", "sqlite"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"engine\":\"sqlite\""))
        .stdout(predicate::str::contains("\"port\":0"));

    spindb(&home)
        .args(["--json", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\":\"notes\""))
        .stdout(predicate::str::contains("\"status\":\"available\""));

    // Duplicate names are refused.
    spindb(&home)
        .args(["--json", "create", "notes", "--engine", "sqlite"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("CONTAINER_ALREADY_EXISTS"));

    // The data file vanishing flips the status to missing.
    let data = home
        .path()
        .join("containers/sqlite/notes/notes.sqlite");
    std::fs::remove_file(&data).unwrap();
    spindb(&home)
        .args(["--json", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\":\"missing\""));

    spindb(&home)
        .args(["delete", "notes"])
        .assert()
        .success();
    assert!(!home.path().join("containers/sqlite/notes").exists());
}

#[test]
fn url_command_prints_the_connection_string() {
    let home = TempDir::new().unwrap();
    spindb(&home)
        .args(["create", "notes", "--engine", "sqlite"])
        .assert()
        .success();
    spindb(&home)
        .args(["url", "notes"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("sqlite://"));
}

#[test]
fn missing_container_reports_not_found() {
    let home = TempDir::new().unwrap();
    spindb(&home)
        .args(["--json", "info", "ghost"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("CONTAINER_NOT_FOUND"));
}
