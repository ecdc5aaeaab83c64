//! Smoke tests for the `pspec` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn spec_dir(content: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("smoke.pspec"), content).unwrap();
    dir
}

#[test]
fn passing_tree_exits_zero() {
    let dir = spec_dir("Example('smoke', Given('1 + 1'), Evaluates_to(2))");
    Command::cargo_bin("pspec")
        .unwrap()
        .arg(dir.path())
        .arg("--no-color")
        .assert()
        .success()
        .stdout(predicate::str::contains("PASS: smoke"))
        .stdout(predicate::str::contains("passed 1"));
}

#[test]
fn failing_tree_exits_nonzero() {
    let dir = spec_dir("Example('smoke', Given('1 + 1'), Evaluates_to(3))");
    Command::cargo_bin("pspec")
        .unwrap()
        .arg(dir.path())
        .arg("--no-color")
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAIL: smoke"));
}
