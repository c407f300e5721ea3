//! End-to-end runs of the `tasksync` binary against service files in a temp dir.

mod common;

use assert_cmd::Command;
use chrono::Local;
use common::cli::{SyncWorkspace, run_tasksync, run_tasksync_with_env};
use common::fixtures::container;
use predicates::prelude::*;
use std::fs;
use tasksync::client::{ServiceState, StoredRecord};
use tasksync::model::Priority;

fn today() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

fn seed(workspace: &SyncWorkspace) {
    workspace.write_service(
        "todoist.json",
        &ServiceState {
            containers: vec![container("p-inbox", "Inbox")],
            records: vec![
                StoredRecord {
                    due: Some(today()),
                    priority: Some(Priority::P1),
                    ..StoredRecord::new("t1", "p-inbox", "Pay rent")
                },
                StoredRecord::new("t2", "p-inbox", "Someday maybe"),
            ],
            next_id: 10,
        },
    );
    workspace.write_service(
        "gtasks.json",
        &ServiceState {
            containers: vec![container("L1", "My Tasks")],
            records: Vec::new(),
            next_id: 0,
        },
    );
}

#[test]
fn sync_pass_creates_mirror_and_persists_mapping() {
    let _log = common::test_log("sync_pass_creates_mirror_and_persists_mapping");
    let workspace = SyncWorkspace::new();
    seed(&workspace);

    let run = run_tasksync(&workspace, ["sync"], "sync_first");
    assert!(run.status.success(), "stderr: {}", run.stderr);
    assert!(
        run.stdout.starts_with("Sync pass complete: 1 created, 0 updated"),
        "stdout: {}",
        run.stdout
    );

    let gtasks = workspace.read_service("gtasks.json");
    assert_eq!(gtasks.records.len(), 1);
    assert_eq!(gtasks.records[0].title, "Pay rent");
    assert!(workspace.state_file("sync").exists());

    let run = run_tasksync(&workspace, ["sync"], "sync_second");
    assert!(run.status.success(), "stderr: {}", run.stderr);
    assert!(run.stdout.contains("0 created"), "stdout: {}", run.stdout);
    assert!(run.stdout.contains("1 unchanged"), "stdout: {}", run.stdout);
}

#[test]
fn json_output_is_one_result_object() {
    let workspace = SyncWorkspace::new();
    seed(&workspace);

    let run = run_tasksync(&workspace, ["sync", "--json"], "sync_json");
    assert!(run.status.success(), "stderr: {}", run.stderr);
    let result: serde_json::Value = serde_json::from_str(run.stdout.trim()).expect("json");
    assert_eq!(result["tool"], "sync");
    assert_eq!(result["dry_run"], false);
    assert_eq!(result["counts"]["created"], 1);
    assert_eq!(result["counts"]["skipped"], 1);
}

#[test]
fn dry_run_leaves_every_file_untouched() {
    let _log = common::test_log("dry_run_leaves_every_file_untouched");
    let workspace = SyncWorkspace::new();
    seed(&workspace);
    let before = workspace.read_service("gtasks.json");

    let run = run_tasksync(&workspace, ["sync", "--dry-run", "-v"], "sync_dry_run");
    assert!(run.status.success(), "stderr: {}", run.stderr);
    assert!(run.stdout.starts_with("Dry run complete: 1 created"), "stdout: {}", run.stdout);
    assert!(run.stderr.contains("[dry-run] would"), "stderr: {}", run.stderr);

    assert_eq!(workspace.read_service("gtasks.json"), before);
    assert!(!workspace.state_file("sync").exists());
}

#[test]
fn status_lists_every_tool() {
    let workspace = SyncWorkspace::new();
    seed(&workspace);
    let run = run_tasksync(&workspace, ["sync"], "status_seed");
    assert!(run.status.success(), "stderr: {}", run.stderr);

    let run = run_tasksync(&workspace, ["status"], "status_text");
    assert!(run.status.success(), "stderr: {}", run.stderr);
    assert!(run.stdout.starts_with("Mapping stores in .tasksync"), "stdout: {}", run.stdout);
    for tool in ["sync", "mirror", "recur", "starred"] {
        assert!(run.stdout.contains(tool), "missing {tool}: {}", run.stdout);
    }

    let run = run_tasksync(&workspace, ["status", "--json"], "status_json");
    let statuses: serde_json::Value = serde_json::from_str(&run.stdout).expect("json");
    let sync = statuses
        .as_array()
        .expect("array")
        .iter()
        .find(|s| s["tool"] == "sync")
        .expect("sync entry");
    assert_eq!(sync["mappings"], 1);
    assert_eq!(sync["locked"], false);
}

#[test]
fn missing_source_path_is_a_config_error() {
    let workspace = SyncWorkspace::new();
    workspace.write_config("target:\n  path: gtasks.json\n");

    let run = run_tasksync(&workspace, ["sync", "--json", "-q"], "missing_source");
    assert_eq!(run.code(), Some(2));
    let err: serde_json::Value = serde_json::from_str(&run.stderr).expect("json error");
    assert_eq!(err["error"]["code"], "MISSING_SETTING");
}

#[test]
fn malformed_config_is_a_config_error() {
    let workspace = SyncWorkspace::new();
    workspace.write_config("sync: [unclosed\n");

    let run = run_tasksync(&workspace, ["sync"], "malformed_config");
    assert_eq!(run.code(), Some(2), "stderr: {}", run.stderr);
}

#[test]
fn starred_needs_no_source_file() {
    let workspace = SyncWorkspace::new();
    workspace.write_config("target:\n  path: lists.json\n");
    workspace.write_service(
        "lists.json",
        &ServiceState {
            containers: vec![container("L1", "Work")],
            records: vec![StoredRecord::new("a1", "L1", "Call mom ⭐")],
            next_id: 0,
        },
    );

    let run = run_tasksync(&workspace, ["starred"], "starred");
    assert!(run.status.success(), "stderr: {}", run.stderr);
    let lists = workspace.read_service("lists.json");
    assert!(lists.containers.iter().any(|c| c.name == "TRMNL"));
    assert!(lists.records.iter().any(|r| r.title == "Call mom"));
}

#[test]
fn corrupt_store_fails_with_store_exit_code() {
    let workspace = SyncWorkspace::new();
    seed(&workspace);
    let store = workspace.state_file("sync");
    fs::create_dir_all(store.parent().expect("parent")).expect("state dir");
    fs::write(&store, "{ not json").expect("write store");

    let run = run_tasksync(&workspace, ["sync"], "corrupt_store");
    assert_eq!(run.code(), Some(4), "stderr: {}", run.stderr);
    assert!(workspace.read_service("gtasks.json").records.is_empty());
}

#[test]
fn fresh_lock_blocks_a_second_pass() {
    let workspace = SyncWorkspace::new();
    seed(&workspace);
    let store = workspace.state_file("sync");
    fs::create_dir_all(store.parent().expect("parent")).expect("state dir");
    let lock = store.with_file_name("sync-mappings.json.lock");
    fs::write(
        &lock,
        format!(
            r#"{{"pid": 1, "acquired_at": "{}"}}"#,
            chrono::Utc::now().to_rfc3339()
        ),
    )
    .expect("write lock");

    let run = run_tasksync(&workspace, ["sync", "--json", "-q"], "locked_store");
    assert_eq!(run.code(), Some(4), "stderr: {}", run.stderr);
    let err: serde_json::Value = serde_json::from_str(&run.stderr).expect("json error");
    assert_eq!(err["error"]["code"], "STORE_LOCKED");
    assert_eq!(err["error"]["retryable"], true);
    assert!(lock.exists());

    // Dry runs take no lock.
    let run = run_tasksync(&workspace, ["sync", "--dry-run"], "locked_dry_run");
    assert!(run.status.success(), "stderr: {}", run.stderr);
}

#[test]
fn env_overrides_config_file() {
    let workspace = SyncWorkspace::new();
    seed(&workspace);

    let run = run_tasksync_with_env(
        &workspace,
        ["sync"],
        [("TASKSYNC_SYNC_TARGET_LIST", "Errands")],
        "env_override",
    );
    assert!(run.status.success(), "stderr: {}", run.stderr);
    let gtasks = workspace.read_service("gtasks.json");
    let errands = gtasks
        .containers
        .iter()
        .find(|c| c.name == "Errands")
        .expect("list created from env setting");
    assert_eq!(gtasks.records[0].container_id, errands.id);
}

#[test]
fn completions_print_a_script() {
    let workspace = SyncWorkspace::new();
    Command::new(assert_cmd::cargo::cargo_bin!("tasksync"))
        .current_dir(&workspace.root)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tasksync"));
}

#[test]
fn unknown_subcommand_is_rejected() {
    Command::new(assert_cmd::cargo::cargo_bin!("tasksync"))
        .arg("reconcile")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}
