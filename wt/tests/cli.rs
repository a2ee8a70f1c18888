//! Integration tests for the pinpoint-wt binary
//!
//! Each test runs inside its own temp directory with the data and config
//! directories redirected there, so no log or config leaks between runs.

use std::path::Path;
use std::process::Command as StdCommand;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn pinpoint_wt(home: &Path, cwd: &Path) -> Command {
    let mut cmd = Command::cargo_bin("pinpoint-wt").expect("binary builds");
    cmd.current_dir(cwd)
        .env("HOME", home)
        .env("XDG_DATA_HOME", home.join("data"))
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env_remove("RUST_LOG");
    cmd
}

fn sandbox() -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let repo = temp_dir.path().join("PinPoint");
    std::fs::create_dir_all(&repo).expect("Failed to create repo dir");
    (temp_dir, repo)
}

fn git(cwd: &Path, args: &[&str]) {
    let status = StdCommand::new("git")
        .args(args)
        .current_dir(cwd)
        .status()
        .expect("git runs");
    assert!(status.success(), "git {:?} failed", args);
}

// =============================================================================
// Help and argument handling
// =============================================================================

#[test]
fn test_help_lists_commands() {
    let (temp_dir, repo) = sandbox();
    pinpoint_wt(temp_dir.path(), &repo)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("Required Tools:"))
        .stdout(predicate::str::contains("Logs are written to:"));
}

#[test]
fn test_subcommand_help() {
    let (temp_dir, repo) = sandbox();
    pinpoint_wt(temp_dir.path(), &repo)
        .args(["update", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--validate"));
}

#[test]
fn test_missing_subcommand_fails() {
    let (temp_dir, repo) = sandbox();
    pinpoint_wt(temp_dir.path(), &repo).assert().failure();
}

// =============================================================================
// Remove
// =============================================================================

#[test]
fn test_remove_missing_worktree_exits_nonzero() {
    let (temp_dir, repo) = sandbox();
    pinpoint_wt(temp_dir.path(), &repo)
        .args(["remove", "feat/does-not-exist"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Error"));
}

#[test]
fn test_remove_json_keeps_stdout_clean_on_error() {
    let (temp_dir, repo) = sandbox();
    pinpoint_wt(temp_dir.path(), &repo)
        .args(["remove", "feat/does-not-exist", "--json"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

// =============================================================================
// List and sync against a real repository
// =============================================================================

#[test]
fn test_list_shows_main_worktree() {
    let (temp_dir, repo) = sandbox();
    git(&repo, &["init", "-q", "-b", "main"]);
    git(&repo, &["-c", "user.email=t@t", "-c", "user.name=t", "commit", "-q", "--allow-empty", "-m", "init"]);

    pinpoint_wt(temp_dir.path(), &repo)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("WORKTREE"))
        .stdout(predicate::str::contains("PinPoint"))
        .stdout(predicate::str::contains("static"));
}

#[test]
fn test_sync_without_template_skips() {
    let (temp_dir, repo) = sandbox();
    git(&repo, &["init", "-q", "-b", "main"]);

    pinpoint_wt(temp_dir.path(), &repo)
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("Syncing current worktree"))
        .stdout(predicate::str::contains("No template found"))
        .stdout(predicate::str::contains("Sync complete"));
}

#[test]
fn test_sync_write_failure_exits_nonzero() {
    let (temp_dir, repo) = sandbox();
    git(&repo, &["init", "-q", "-b", "main"]);
    std::fs::create_dir_all(repo.join("supabase/config.toml")).expect("Failed to create blocking dir");
    std::fs::write(
        repo.join("supabase/config.toml.template"),
        "project_id = \"pinpoint\"\n\n[api]\nport = 54321\n",
    )
    .expect("Failed to write template");

    pinpoint_wt(temp_dir.path(), &repo)
        .arg("sync")
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("1 worktree(s) failed to sync"))
        .stdout(predicate::str::contains("Sync complete").not());
}
