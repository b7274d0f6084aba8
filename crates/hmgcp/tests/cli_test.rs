use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn hmgcp() -> Command {
    Command::cargo_bin("hmgcp").unwrap()
}

#[test]
fn test_inline_expression() {
    hmgcp()
        .args(["-e", "(+ 2 3)"])
        .env("NO_COLOR", "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("int64"))
        .stdout(predicate::str::contains("5"));
}

#[test]
fn test_json_report() {
    let out = hmgcp().args(["--json", "-e", "(dec 3)"]).output().unwrap();
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["type"], "int64");
    assert_eq!(json["flow"], "2");
}

#[test]
fn test_reads_file_and_config() {
    let mut src = tempfile::NamedTempFile::new().unwrap();
    write!(src, "(+ 2 3)").unwrap();
    let mut config = tempfile::NamedTempFile::new().unwrap();
    write!(config, r#"{{ "do_hm": false }}"#).unwrap();

    let out = hmgcp()
        .arg(src.path())
        .arg("--json")
        .arg("--config")
        .arg(config.path())
        .output()
        .unwrap();
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["flow"], "5");
}

#[test]
fn test_reads_stdin() {
    hmgcp()
        .arg("--json")
        .write_stdin("\"abc\"")
        .assert()
        .success()
        .stdout(predicate::str::contains("\\\"abc\\\""));
}

#[test]
fn test_undefined_name_fails() {
    hmgcp()
        .args(["-e", "(dec y)"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("'y' is undefined"));
}

#[test]
fn test_dump_lists_nodes() {
    hmgcp()
        .args(["--dump", "-e", "(dec 3)"])
        .assert()
        .success()
        .stdout(predicate::str::contains("HMT="))
        .stdout(predicate::str::contains("GCP="));
}
