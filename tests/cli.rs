use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("director").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: director <COMMAND>"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("fields"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn test_cli_serve_help() {
    let mut cmd = Command::cargo_bin("director").unwrap();
    cmd.arg("serve")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: director serve"))
        .stdout(predicate::str::contains("--port <PORT>"));
}

#[test]
fn test_cli_chat_help() {
    let mut cmd = Command::cargo_bin("director").unwrap();
    cmd.arg("chat")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--image <IMAGE>"));
}

#[test]
fn test_cli_fields_lists_schema() {
    let mut cmd = Command::cargo_bin("director").unwrap();
    cmd.arg("fields")
        .assert()
        .success()
        .stdout(predicate::str::contains("1. Project Context (project_context)"))
        .stdout(predicate::str::contains("- project_type: What are we creating?"))
        .stdout(predicate::str::contains("9. Delivery (delivery)"));
}

#[test]
fn test_cli_invalid_config_is_fatal() {
    let mut cmd = Command::cargo_bin("director").unwrap();
    cmd.env("DIRECTOR_CALL_TIMEOUT_SECS", "soon")
        .arg("chat")
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_cli_chat_quits_on_eof() {
    let mut cmd = Command::cargo_bin("director").unwrap();
    cmd.env("OLLAMA_URL", "http://127.0.0.1:9")
        .arg("chat")
        .write_stdin("/status\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Phase: project_context (CLARIFYING)"));
}

#[test]
fn test_cli_chat_quit_command() {
    let mut cmd = Command::cargo_bin("director").unwrap();
    cmd.env("OLLAMA_URL", "http://127.0.0.1:9")
        .arg("chat")
        .write_stdin("/quit\n/status\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Phase:").not());
}

#[test]
fn test_cli_excessive_retries_are_fatal() {
    let mut cmd = Command::cargo_bin("director").unwrap();
    cmd.env("DIRECTOR_CALL_RETRIES", "10")
        .arg("chat")
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DIRECTOR_CALL_RETRIES"));
}

#[test]
fn test_cli_no_command() {
    let mut cmd = Command::cargo_bin("director").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage: director <COMMAND>"));
}
