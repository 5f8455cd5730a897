//! Black-box tests of the `bulk-kit` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn bulk_kit(root: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("bulk-kit").unwrap();
    cmd.arg("--root").arg(root.path()).env("NO_COLOR", "1");
    cmd
}

fn initialized() -> TempDir {
    let root = tempfile::tempdir().unwrap();
    bulk_kit(&root).arg("init").assert().success();
    root
}

#[test]
fn test_init_refuses_to_overwrite_without_force() {
    let root = initialized();

    bulk_kit(&root)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    bulk_kit(&root).args(["init", "--force", "--minimal"]).assert().success();
}

#[test]
fn test_jobs_lists_scaffolded_jobs() {
    let root = initialized();

    bulk_kit(&root)
        .arg("jobs")
        .assert()
        .success()
        .stdout(predicate::str::contains("archive-teams"))
        .stdout(predicate::str::contains("school-year-transition"));
}

#[test]
fn test_run_prints_json_result() {
    let root = initialized();

    let output = bulk_kit(&root)
        .args(["run", "archive-teams", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let result: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(result["status"], "COMPLETED");
    assert_eq!(result["success"], true);
    assert_eq!(result["operation_type"], "TEAM_ARCHIVE");
}

#[test]
fn test_run_health_check_prints_report() {
    let root = initialized();

    bulk_kit(&root)
        .args(["run", "health-check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Overall: HEALTHY"))
        .stdout(predicate::str::contains("directory-api"));
}

#[test]
fn test_run_unknown_job_fails() {
    let root = initialized();

    bulk_kit(&root)
        .args(["run", "does-not-exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown job 'does-not-exist'"));
}
