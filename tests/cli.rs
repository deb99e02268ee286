// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipewright contributors

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

const VALID: &str = r#"
name: demo
stages:
  - name: build
    action:
      type: command
      program: echo
      args: ["building"]
  - name: test
    action:
      type: command
      program: echo
      args: ["testing"]
    depends_on: [build]
"#;

const CYCLIC: &str = r#"
name: loop
stages:
  - name: a
    action: { type: command, program: "true" }
    depends_on: [b]
  - name: b
    action: { type: command, program: "true" }
    depends_on: [a]
"#;

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

fn pipewright(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("pipewright").unwrap();
    cmd.current_dir(dir)
        .env("PIPEWRIGHT_LOG", "off")
        .env("NO_COLOR", "1")
        .env("PIPEWRIGHT_WORKSPACE_ROOT", dir.join("ws"));
    cmd
}

#[test]
fn validate_accepts_a_good_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "pipewright.yaml", VALID);

    pipewright(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Pipeline is valid"));
}

#[test]
fn validate_reports_cycles() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "loop.yaml", CYCLIC);

    pipewright(dir.path())
        .args(["validate", "loop.yaml"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Circular dependency"));
}

#[test]
fn missing_pipeline_file_fails() {
    let dir = tempfile::tempdir().unwrap();

    pipewright(dir.path())
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Pipeline file not found"));
}

#[test]
fn graph_renders_mermaid() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "pipewright.yaml", VALID);

    pipewright(dir.path())
        .args(["graph", "--format", "mermaid"])
        .assert()
        .success()
        .stdout(predicate::str::contains("graph TD"))
        .stdout(predicate::str::contains("s0 --> s1"));
}

#[test]
fn graph_text_lists_execution_order() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "pipewright.yaml", VALID);

    pipewright(dir.path())
        .arg("graph")
        .assert()
        .success()
        .stdout(predicate::str::contains("1. build"))
        .stdout(predicate::str::contains("2. test"));
}

#[cfg(unix)]
#[test]
fn run_streams_stage_output() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "pipewright.yaml", VALID);

    pipewright(dir.path())
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("[build] building"))
        .stdout(predicate::str::contains("[test] testing"));
}

#[cfg(unix)]
#[test]
fn run_json_report() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "pipewright.yaml", VALID);

    let output = pipewright(dir.path())
        .args(["run", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["pipeline"], "demo");
    assert_eq!(report["status"], "succeeded");
    assert_eq!(report["stages"].as_array().unwrap().len(), 2);
}

#[cfg(unix)]
#[test]
fn failing_stage_fails_the_command() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "pipewright.yaml",
        r#"
name: broken
stages:
  - name: build
    action: { type: command, program: "false" }
  - name: deploy
    action: { type: command, program: echo, args: ["deploying"] }
    depends_on: [build]
"#,
    );

    pipewright(dir.path())
        .arg("run")
        .assert()
        .failure()
        .stdout(predicate::str::contains("skipped"))
        .stdout(predicate::str::contains("[deploy]").not());
}
