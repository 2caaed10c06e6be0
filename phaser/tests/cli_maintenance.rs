//! CLI tests for `phaser plan`, `cleanup`, `reset`, and the `run` entry checks.
//!
//! Spawns the phaser binary against a temp data directory and verifies exit
//! codes and on-disk effects.

use std::path::Path;
use std::process::{Command, Output};

use phaser::exit_codes;
use phaser::io::ledger_store::{Ledger, load_ledger};
use phaser::test_support::TestData;

fn phaser(data_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_phaser"))
        .arg("--data-dir")
        .arg(data_dir)
        .args(args)
        .output()
        .expect("spawn phaser")
}

fn seeded() -> TestData {
    let data = TestData::new();
    data.add_account("a1");
    data.add_account("a2");
    data.add_resource("https://surface.test/p/1");
    let mut ledger = Ledger::open(&data.paths.ledger_path).expect("ledger");
    ledger.mark_login_attempt("a1", true).expect("login");
    ledger
        .mark_post_processed("a1", "https://surface.test/p/1")
        .expect("processed");
    ledger.mark_login_attempt("a2", false).expect("login");
    data
}

#[test]
fn init_creates_data_dir() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("data");

    let output = phaser(&root, &["init"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(root.join("config.toml").is_file());
    let again = phaser(&root, &["init"]);
    assert_eq!(again.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn plan_with_pending_work_exits_ok() {
    let data = TestData::new();
    data.add_account("a1");
    data.add_resource("https://surface.test/p/1");

    let output = phaser(&data.paths.root, &["plan"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Pending logins (1):"));
}

#[test]
fn plan_complete_exits_with_complete_code() {
    let data = seeded();

    let output = phaser(&data.paths.root, &["plan"]);

    assert_eq!(output.status.code(), Some(exit_codes::COMPLETE));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Nothing pending."));
}

#[test]
fn plan_without_init_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = phaser(&temp.path().join("missing"), &["plan"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("phaser init"));
}

#[test]
fn run_without_init_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = phaser(&temp.path().join("missing"), &["run"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("phaser init"));
}

#[cfg(not(feature = "browser"))]
#[test]
fn run_without_browser_backend_explains_rebuild() {
    let data = TestData::new();

    let output = phaser(&data.paths.root, &["run"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--features browser"));
    assert!(!data.paths.ledger_path.exists());
}

/// Verifies a dry run leaves the ledger byte-for-byte unchanged and a real
/// cleanup makes the account pending again.
#[test]
fn cleanup_dry_run_then_apply() {
    let data = seeded();
    let before = std::fs::read_to_string(&data.paths.ledger_path).expect("read");

    let preview = phaser(&data.paths.root, &["cleanup", "--account-ids", "a2", "--dry-run"]);

    assert_eq!(preview.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&preview.stdout).contains("Would remove accounts: a2"));
    assert_eq!(
        std::fs::read_to_string(&data.paths.ledger_path).expect("read"),
        before
    );

    let applied = phaser(&data.paths.root, &["cleanup", "--account-ids", "a2"]);

    assert_eq!(applied.status.code(), Some(exit_codes::OK));
    let state = load_ledger(&data.paths.ledger_path).expect("ledger");
    assert!(!state.was_attempted("a2"));
    assert!(state.has_processed("a1", "https://surface.test/p/1"));
    let plan = phaser(&data.paths.root, &["plan"]);
    assert_eq!(plan.status.code(), Some(exit_codes::OK));
}

#[test]
fn reset_requires_confirmation() {
    let data = seeded();
    let session_id = load_ledger(&data.paths.ledger_path)
        .expect("ledger")
        .session_id;

    let refused = phaser(&data.paths.root, &["reset"]);
    assert_eq!(refused.status.code(), Some(exit_codes::INVALID));

    let reset = phaser(&data.paths.root, &["reset", "--yes"]);
    assert_eq!(reset.status.code(), Some(exit_codes::OK));
    let state = load_ledger(&data.paths.ledger_path).expect("ledger");
    assert!(state.login_attempts.is_empty());
    assert!(state.processed.is_empty());
    assert!(state.failed_logins.is_empty());
    assert_ne!(state.session_id, session_id);
}

#[test]
fn cleanup_without_ledger_is_invalid() {
    let data = TestData::new();

    let output = phaser(&data.paths.root, &["cleanup", "--account-ids", "a1"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no ledger"));
}
