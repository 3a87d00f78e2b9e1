//! Integration tests for the parun CLI.
//!
//! These run the real binary end-to-end: the coordinator re-executes itself
//! as workers, and items run small shell commands.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::{NamedTempFile, tempdir};

/// Get a command for the parun binary with a clean environment.
fn parun() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("parun").unwrap();
    cmd.env_remove("PARUN_WORKERS")
        .env_remove("PARUN_REPORT_FILE")
        .env_remove("PARUN_LOG")
        .env_remove("RUST_LOG")
        .arg("--no-color");
    cmd
}

fn count(needle: &'static str, expected: usize) -> impl Predicate<str> {
    predicate::function(move |s: &str| s.matches(needle).count() == expected)
}

#[test]
fn test_help_displays() {
    parun()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("completions"));
}

#[test]
fn test_version_displays() {
    parun()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("parun"))
        .stdout(predicate::str::is_match(r"\d+\.\d+\.\d+").unwrap());
}

#[test]
fn test_run_help_hides_worker_mode() {
    parun()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--workers"))
        .stdout(predicate::str::contains("internal-worker").not());
}

#[test]
fn test_four_items_two_workers() {
    parun()
        .args(["run", "-n", "2"])
        .args(["--item", "a", "--item", "b", "--item", "c", "--item", "d"])
        .args(["--", "true"])
        .assert()
        .code(0)
        .stdout(count("PASSED", 4))
        .stdout(count(" processed ", 2))
        .stdout(predicate::str::contains("worker 0 processed"))
        .stdout(predicate::str::contains("worker 1 processed"))
        .stdout(predicate::str::contains(
            "4 passed, 0 failed, 4 of 4 item(s) completed",
        ))
        .stdout(predicate::str::contains("unaccounted").not());
}

#[test]
fn test_idle_workers_report_zero_items() {
    parun()
        .args(["run", "-n", "3", "--", "true"])
        .assert()
        .code(0)
        .stdout(count("processed 0 item(s)", 3))
        .stdout(predicate::str::contains("0 of 0 item(s) completed"));
}

#[test]
fn test_workers_from_environment() {
    parun()
        .env("PARUN_WORKERS", "2")
        .args(["run", "--", "true"])
        .assert()
        .code(0)
        .stdout(count(" processed ", 2));
}

#[test]
fn test_failing_items_exit_one() {
    parun()
        .args(["run", "-n", "2", "--item", "good", "--item", "bad"])
        .args(["--", "sh", "-c", "test {} = good"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("PASSED good"))
        .stdout(predicate::str::contains("FAILED bad"))
        .stdout(predicate::str::contains("1 passed, 1 failed, 2 of 2 item(s) completed"))
        .stderr(predicate::str::contains("FAILED bad (worker"));
}

#[test]
fn test_show_output_for_failures() {
    parun()
        .args(["run", "-n", "1", "--item", "x", "--show-output"])
        .args(["--", "sh", "-c", "echo boom-{}; exit 1"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("    boom-x"));
}

#[test]
fn test_missing_item_command_fails_setup() {
    parun()
        .args(["run", "-n", "1", "--item", "x", "--", "/nonexistent/parun-item"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("0 passed, 1 failed, 1 of 1 item(s) completed"));
}

#[test]
fn test_items_file_and_collect_combine() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "# header").unwrap();
    writeln!(file, "f1").unwrap();
    writeln!(file, "f2").unwrap();

    parun()
        .args(["run", "-n", "2", "--item", "i1"])
        .arg("--items")
        .arg(file.path())
        .args(["--collect", "echo c1"])
        .args(["--", "true"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("4 passed, 0 failed, 4 of 4 item(s) completed"));
}

#[test]
fn test_items_from_stdin() {
    parun()
        .args(["run", "-n", "2", "--items", "-", "--", "true"])
        .write_stdin("s1\ns2\ns3\n")
        .assert()
        .code(0)
        .stdout(predicate::str::contains("3 of 3 item(s) completed"));
}

#[test]
fn test_report_file_gets_every_report() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("reports.jsonl");

    parun()
        .args(["run", "-n", "2", "-q", "--item", "a", "--item", "b", "--item", "c"])
        .arg("--report-file")
        .arg(&path)
        .args(["--", "true"])
        .assert()
        .code(0)
        // Quiet mode drops per-item lines but keeps the summary
        .stdout(predicate::str::contains("PASSED").not())
        .stdout(predicate::str::contains("3 passed"));

    let text = std::fs::read_to_string(&path).unwrap();
    let mut items: Vec<String> = text
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(value["phase"], "call");
            assert_eq!(value["outcome"], "passed");
            value["item"].as_str().unwrap().to_string()
        })
        .collect();
    items.sort();
    assert_eq!(items, vec!["a", "b", "c"]);
}

#[test]
fn test_item_too_long_is_fatal() {
    parun()
        .args(["run", "-n", "1", "--item", &"x".repeat(600), "--", "true"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("600 bytes"));
}

#[test]
fn test_failing_collect_is_fatal() {
    parun()
        .args(["run", "--collect", "exit 3", "--", "true"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to collect work items"));
}

#[test]
fn test_zero_workers_rejected() {
    parun()
        .args(["run", "-n", "0", "--", "true"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("at least 1"));
}

#[test]
fn test_command_required() {
    parun()
        .args(["run", "--item", "a"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("COMMAND"));
}

#[test]
fn test_completions_bash() {
    parun()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("_parun()"));
}

#[test]
fn test_completions_zsh() {
    parun()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef parun"));
}
