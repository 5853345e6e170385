//! End-to-end tests for the stackwise CLI over temporary unit trees.
//!
//! None of these need a terragrunt binary: units without a
//! `.terragrunt-cache` are never probed, and runs use `--dry-run`.

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

use common::{dependency_block, web_db_tree, write_unit, DB, WEB};

/// Builds a `stackwise` Command rooted at `root`, run from inside it so no
/// stray config file is picked up.
fn stackwise_cmd(root: &Path) -> Command {
    let mut cmd = assert_cmd::cargo_bin_cmd!("stackwise");
    cmd.current_dir(root)
        .env("NO_COLOR", "1")
        .env("HOME", root)
        .arg("--root")
        .arg(root);
    cmd
}

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    web_db_tree(dir.path());
    dir
}

#[test]
fn e2e_list_shows_discovered_units() {
    let dir = fixture();
    stackwise_cmd(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(WEB))
        .stdout(predicate::str::contains(DB))
        .stdout(predicate::str::contains("not-deployed"))
        .stdout(predicate::str::contains("2 unit(s) total."));
}

#[test]
fn e2e_list_json_respects_env_filter() {
    let dir = fixture();
    write_unit(dir.path(), "live/acct1/prod/proj1/compute/web", "");

    let output = stackwise_cmd(dir.path())
        .args(["--json", "list", "--env", "prod"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let units: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let units = units.as_array().unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0]["path"], "live/acct1/prod/proj1/compute/web");
    assert_eq!(units[0]["resource_type"], "compute");
    assert_eq!(units[0]["environment_type"], "production");
}

#[test]
fn e2e_show_unit_detail() {
    let dir = fixture();
    stackwise_cmd(dir.path())
        .args(["show", DB])
        .assert()
        .success()
        .stdout(predicate::str::contains("Unit:"))
        .stdout(predicate::str::contains(WEB));

    stackwise_cmd(dir.path())
        .args(["show", "live/acct1/dev/proj1/compute/none"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn e2e_order_prints_batches() {
    let dir = fixture();
    stackwise_cmd(dir.path())
        .arg("order")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Batch 1: {WEB}")))
        .stdout(predicate::str::contains(format!("Batch 2: {DB}")));

    let output = stackwise_cmd(dir.path())
        .args(["--json", "order"])
        .output()
        .unwrap();
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["batches"], serde_json::json!([[WEB], [DB]]));
}

#[test]
fn e2e_order_strict_fails_on_cycle() {
    let dir = TempDir::new().unwrap();
    write_unit(dir.path(), WEB, &dependency_block("db", "../db"));
    write_unit(dir.path(), DB, &dependency_block("web", "../web"));

    stackwise_cmd(dir.path())
        .arg("order")
        .assert()
        .success()
        .stdout(predicate::str::contains("Circular dependency detected"));

    stackwise_cmd(dir.path())
        .args(["order", "--strict"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("circular dependency"));
}

#[test]
fn e2e_graph_formats() {
    let dir = fixture();

    stackwise_cmd(dir.path())
        .arg("graph")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Infrastructure"))
        .stdout(predicate::str::contains("db (compute) [deps: 1]"));

    stackwise_cmd(dir.path())
        .args(["graph", "-f", "dag"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("  depends on: [{WEB}]")));

    stackwise_cmd(dir.path())
        .args(["graph", "-e", "dot"])
        .assert()
        .success()
        .stdout(predicate::str::contains("digraph stackwise {"));

    stackwise_cmd(dir.path())
        .args(["graph", "-e", "mermaid"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("graph TD"));

    stackwise_cmd(dir.path())
        .args(["graph", "-e", "svg"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown export format"));
}

#[test]
fn e2e_run_dry_run() {
    let dir = fixture();
    stackwise_cmd(dir.path())
        .args(["run", "live/acct1/dev/proj1", "apply", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(dry run)"))
        .stdout(predicate::str::contains("2 completed"));

    let output = stackwise_cmd(dir.path())
        .args(["--json", "run", "live/acct1/dev/proj1", "plan", "--dry-run"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let execution: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(execution["status"], "deployed");
    assert_eq!(
        execution["unit_results"][WEB]["output"][0],
        "[dry-run] terragrunt run plan --backend-bootstrap"
    );
}

#[test]
fn e2e_run_missing_target_fails() {
    let dir = fixture();
    stackwise_cmd(dir.path())
        .args(["run", "live/acct9", "apply", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("target not found"));
}

#[test]
fn e2e_missing_root_fails() {
    let dir = TempDir::new().unwrap();
    let mut cmd = assert_cmd::cargo_bin_cmd!("stackwise");
    cmd.current_dir(dir.path())
        .env("NO_COLOR", "1")
        .env("HOME", dir.path())
        .args(["--root", "does-not-exist", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("root path does not exist"));
}
