//! Git-backed implementations of the version control and registry traits

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::command::{CommandOutput, run, run_checked};
use super::error::CommandError;
use super::{
    BranchSource, MergeOutcome, PullOutcome, StatusSummary, UpstreamStatus, VersionControl, WorktreeEntry,
    WorktreeRegistry,
};

/// Parse `git diff --shortstat` into (insertions, deletions)
pub fn parse_shortstat(shortstat: &str) -> (u32, u32) {
    let Ok(re) = Regex::new(r"(\d+) (insertion|deletion)") else {
        return (0, 0);
    };
    re.captures_iter(shortstat).fold((0, 0), |(ins, del), caps| {
        let count = caps[1].parse().unwrap_or(0);
        match &caps[2] {
            "insertion" => (count, del),
            _ => (ins, count),
        }
    })
}

const NOTHING_TO_STASH: &str = "No local changes to save";

/// Ref of the newest stash entry whose subject ends with `message`
///
/// Input is `git stash list --format=%gd%x09%s`.
pub fn find_stash_ref(list: &str, message: &str) -> Option<String> {
    list.lines().find_map(|line| {
        let (stash_ref, subject) = line.split_once('\t')?;
        subject.ends_with(message).then(|| stash_ref.to_string())
    })
}

/// Parse `git worktree list --porcelain`
pub fn parse_worktree_list(output: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut current: Option<WorktreeEntry> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(WorktreeEntry {
                path: PathBuf::from(path),
                ..Default::default()
            });
            continue;
        }
        let Some(entry) = current.as_mut() else {
            continue;
        };
        if let Some(head) = line.strip_prefix("HEAD ") {
            entry.head = Some(head.to_string());
        } else if let Some(branch) = line.strip_prefix("branch ") {
            entry.branch = Some(branch.strip_prefix("refs/heads/").unwrap_or(branch).to_string());
        } else if line == "detached" {
            entry.detached = true;
        } else if line == "bare" {
            entry.bare = true;
        }
    }
    if let Some(entry) = current {
        entries.push(entry);
    }
    entries
}

/// Git CLI
#[derive(Debug, Clone)]
pub struct Git {
    timeout: Duration,
}

impl Git {
    pub fn new(timeout: Duration) -> Self {
        debug!(?timeout, "Git::new: called");
        Self { timeout }
    }

    async fn git(&self, path: &Path, args: &[&str]) -> Result<CommandOutput, CommandError> {
        run("git", args, Some(path), self.timeout).await
    }

    async fn git_checked(&self, path: &Path, args: &[&str]) -> Result<CommandOutput, CommandError> {
        run_checked("git", args, Some(path), self.timeout).await
    }

    async fn ref_exists(&self, repo: &Path, refname: &str) -> Result<bool, CommandError> {
        let output = self.git(repo, &["rev-parse", "--verify", "--quiet", refname]).await?;
        Ok(output.success())
    }

    async fn upstream_status(&self, path: &Path, branch: &str) -> Result<UpstreamStatus, CommandError> {
        if branch == "HEAD" {
            return Ok(UpstreamStatus::Detached);
        }
        let upstream = self.git(path, &["rev-parse", "--abbrev-ref", "@{u}"]).await?;
        if !upstream.success() {
            return Ok(UpstreamStatus::NoUpstream);
        }
        let counts = self
            .git_checked(path, &["rev-list", "--left-right", "--count", "HEAD...@{u}"])
            .await?;
        let mut parts = counts.stdout.split_whitespace().map(str::parse::<u32>);
        match (parts.next(), parts.next()) {
            (Some(Ok(ahead)), Some(Ok(behind))) => Ok(UpstreamStatus::Tracking { ahead, behind }),
            _ => Err(CommandError::Parse {
                program: "git rev-list".to_string(),
                detail: counts.stdout.trim().to_string(),
            }),
        }
    }
}

#[async_trait]
impl VersionControl for Git {
    async fn current_branch(&self, path: &Path) -> Result<String, CommandError> {
        debug!(?path, "Git::current_branch: called");
        let output = self.git_checked(path, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        Ok(output.stdout.trim().to_string())
    }

    async fn has_local_changes(&self, path: &Path) -> Result<bool, CommandError> {
        debug!(?path, "Git::has_local_changes: called");
        let output = self.git(path, &["diff-index", "--quiet", "HEAD", "--"]).await?;
        match output.code {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            code => Err(CommandError::Failed {
                program: "git diff-index".to_string(),
                code: code.unwrap_or(-1),
                stderr: output.stderr.trim().to_string(),
            }),
        }
    }

    async fn stash_push(&self, path: &Path, message: &str) -> Result<Option<String>, CommandError> {
        debug!(?path, %message, "Git::stash_push: called");
        let output = self.git_checked(path, &["stash", "push", "-u", "-m", message]).await?;
        if output.stdout.contains(NOTHING_TO_STASH) || output.stderr.contains(NOTHING_TO_STASH) {
            debug!("Git::stash_push: nothing to stash");
            return Ok(None);
        }
        let list = self.git_checked(path, &["stash", "list", "--format=%gd%x09%s"]).await?;
        Ok(find_stash_ref(&list.stdout, message))
    }

    async fn stash_pop(&self, path: &Path, stash_ref: &str) -> Result<(), CommandError> {
        debug!(?path, %stash_ref, "Git::stash_pop: called");
        self.git_checked(path, &["stash", "pop", stash_ref]).await?;
        Ok(())
    }

    async fn fetch(&self, path: &Path, remote: &str) -> Result<(), CommandError> {
        debug!(?path, %remote, "Git::fetch: called");
        self.git_checked(path, &["fetch", remote]).await?;
        Ok(())
    }

    async fn pull(&self, path: &Path) -> Result<PullOutcome, CommandError> {
        debug!(?path, "Git::pull: called");
        let output = self.git_checked(path, &["pull"]).await?;
        if output.stdout.contains("Already up to date") {
            Ok(PullOutcome::UpToDate)
        } else {
            Ok(PullOutcome::Pulled)
        }
    }

    async fn checkout_detached(&self, path: &Path, target: &str) -> Result<(), CommandError> {
        debug!(?path, %target, "Git::checkout_detached: called");
        self.git_checked(path, &["checkout", "--detach", target]).await?;
        Ok(())
    }

    async fn head_commit(&self, path: &Path) -> Result<String, CommandError> {
        let output = self.git_checked(path, &["rev-parse", "HEAD"]).await?;
        Ok(output.stdout.trim().to_string())
    }

    async fn merge(&self, path: &Path, branch: &str) -> Result<MergeOutcome, CommandError> {
        debug!(?path, %branch, "Git::merge: called");
        let output = self.git(path, &["merge", "--no-edit", branch]).await?;
        if output.success() {
            if output.stdout.contains("Already up to date") {
                return Ok(MergeOutcome::UpToDate);
            }
            return Ok(MergeOutcome::Merged);
        }
        if output.combined().contains("CONFLICT") {
            debug!("Git::merge: merge stopped with conflicts");
            return Ok(MergeOutcome::Conflicts);
        }
        Err(CommandError::Failed {
            program: "git merge".to_string(),
            code: output.code.unwrap_or(-1),
            stderr: output.stderr.trim().to_string(),
        })
    }

    async fn conflicted_files(&self, path: &Path) -> Result<Vec<String>, CommandError> {
        let output = self
            .git_checked(path, &["diff", "--name-only", "--diff-filter=U"])
            .await?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    async fn commits_behind(&self, path: &Path, upstream: &str) -> Result<u32, CommandError> {
        debug!(?path, %upstream, "Git::commits_behind: called");
        let range = format!("HEAD..{}", upstream);
        let output = self.git_checked(path, &["rev-list", "--count", &range]).await?;
        let text = output.stdout.trim();
        if text.is_empty() {
            return Ok(0);
        }
        text.parse().map_err(|_| CommandError::Parse {
            program: "git rev-list".to_string(),
            detail: text.to_string(),
        })
    }

    async fn skip_worktree(&self, path: &Path, file: &str) -> Result<Option<bool>, CommandError> {
        let output = self.git_checked(path, &["ls-files", "-v", file]).await?;
        Ok(output.stdout.chars().next().map(|flag| flag == 'S'))
    }

    async fn set_skip_worktree(&self, path: &Path, file: &str, enabled: bool) -> Result<(), CommandError> {
        debug!(?path, %file, enabled, "Git::set_skip_worktree: called");
        let flag = if enabled { "--skip-worktree" } else { "--no-skip-worktree" };
        self.git_checked(path, &["update-index", flag, file]).await?;
        Ok(())
    }

    async fn status_summary(&self, path: &Path) -> Result<StatusSummary, CommandError> {
        debug!(?path, "Git::status_summary: called");
        let branch = self.current_branch(path).await?;
        let upstream = self.upstream_status(path, &branch).await?;

        let porcelain = self
            .git_checked(path, &["status", "--porcelain", "--ignore-submodules"])
            .await?;
        let files = porcelain.stdout.lines().filter(|l| !l.trim().is_empty()).count();

        let shortstat = self.git_checked(path, &["diff", "--shortstat"]).await?;
        let (insertions, deletions) = parse_shortstat(&shortstat.stdout);

        Ok(StatusSummary {
            branch,
            upstream,
            files,
            insertions,
            deletions,
        })
    }
}

#[async_trait]
impl WorktreeRegistry for Git {
    async fn list_worktrees(&self, repo: &Path) -> Result<Vec<WorktreeEntry>, CommandError> {
        debug!(?repo, "Git::list_worktrees: called");
        let output = self.git_checked(repo, &["worktree", "list", "--porcelain"]).await?;
        Ok(parse_worktree_list(&output.stdout))
    }

    async fn toplevel(&self, path: &Path) -> Result<PathBuf, CommandError> {
        let output = self.git_checked(path, &["rev-parse", "--show-toplevel"]).await?;
        Ok(PathBuf::from(output.stdout.trim()))
    }

    async fn local_branch_exists(&self, repo: &Path, branch: &str) -> Result<bool, CommandError> {
        self.ref_exists(repo, &format!("refs/heads/{}", branch)).await
    }

    async fn remote_branch_exists(&self, repo: &Path, remote: &str, branch: &str) -> Result<bool, CommandError> {
        self.ref_exists(repo, &format!("refs/remotes/{}/{}", remote, branch)).await
    }

    async fn add_worktree(
        &self,
        repo: &Path,
        path: &Path,
        branch: &str,
        source: &BranchSource,
    ) -> Result<(), CommandError> {
        debug!(?repo, ?path, %branch, ?source, "Git::add_worktree: called");
        let path = path.to_string_lossy();
        match source {
            // git resolves a remote-only branch name to a new tracking branch
            BranchSource::Local | BranchSource::Remote => {
                self.git_checked(repo, &["worktree", "add", &path, branch]).await?;
            }
            BranchSource::New { base } => {
                self.git_checked(repo, &["worktree", "add", "-b", branch, &path, base])
                    .await?;
            }
        }
        Ok(())
    }

    async fn remove_worktree(&self, repo: &Path, path: &Path) -> Result<(), CommandError> {
        debug!(?repo, ?path, "Git::remove_worktree: called");
        let path = path.to_string_lossy();
        self.git_checked(repo, &["worktree", "remove", "--force", &path]).await?;
        Ok(())
    }

    async fn prune(&self, repo: &Path) -> Result<(), CommandError> {
        self.git_checked(repo, &["worktree", "prune"]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::process::Command;

    async fn run_git(dir: &Path, args: &[&str]) {
        let status = Command::new("git").args(args).current_dir(dir).output().await.unwrap();
        assert!(status.status.success(), "git {:?} failed", args);
    }

    async fn setup_git_repo(dir: &Path) {
        run_git(dir, &["init", "-b", "main"]).await;
        run_git(dir, &["config", "user.email", "test@test.com"]).await;
        run_git(dir, &["config", "user.name", "Test"]).await;
        std::fs::write(dir.join("README.md"), "hello\n").unwrap();
        run_git(dir, &["add", "README.md"]).await;
        run_git(dir, &["commit", "-m", "initial"]).await;
    }

    #[test]
    fn test_parse_shortstat() {
        assert_eq!(
            parse_shortstat(" 3 files changed, 10 insertions(+), 4 deletions(-)\n"),
            (10, 4)
        );
        assert_eq!(parse_shortstat(" 1 file changed, 1 insertion(+)"), (1, 0));
        assert_eq!(parse_shortstat(" 1 file changed, 2 deletions(-)"), (0, 2));
        assert_eq!(parse_shortstat(""), (0, 0));
    }

    #[test]
    fn test_parse_worktree_list() {
        let output = "worktree /repo/PinPoint
HEAD 1111111111111111111111111111111111111111
branch refs/heads/main

worktree /repo/pinpoint-worktrees/feat-x
HEAD 2222222222222222222222222222222222222222
branch refs/heads/feat/x

worktree /repo/pinpoint-worktrees/scratch
HEAD 3333333333333333333333333333333333333333
detached
";
        let entries = parse_worktree_list(output);

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].path, PathBuf::from("/repo/PinPoint"));
        assert_eq!(entries[0].branch.as_deref(), Some("main"));
        assert_eq!(entries[1].branch.as_deref(), Some("feat/x"));
        assert!(entries[2].detached);
        assert_eq!(entries[2].branch, None);
    }

    #[tokio::test]
    async fn test_git_branch_and_changes() {
        let temp = tempdir().unwrap();
        setup_git_repo(temp.path()).await;
        let git = Git::new(Duration::from_secs(30));

        assert_eq!(git.current_branch(temp.path()).await.unwrap(), "main");
        assert!(!git.has_local_changes(temp.path()).await.unwrap());

        std::fs::write(temp.path().join("README.md"), "changed\n").unwrap();
        assert!(git.has_local_changes(temp.path()).await.unwrap());

        let summary = git.status_summary(temp.path()).await.unwrap();
        assert_eq!(summary.files, 1);
        assert_eq!(summary.upstream, UpstreamStatus::NoUpstream);
        assert_eq!(summary.to_string(), "branch main | no upstream | files 1, +1/-1");
    }

    #[tokio::test]
    async fn test_git_stash_round_trip() {
        let temp = tempdir().unwrap();
        setup_git_repo(temp.path()).await;
        let git = Git::new(Duration::from_secs(30));

        assert_eq!(git.stash_push(temp.path(), "sync-worktrees-auto-main-empty").await.unwrap(), None);

        // An older entry must not be the one popped
        std::fs::write(temp.path().join("README.md"), "older\n").unwrap();
        run_git(temp.path(), &["stash", "push", "-m", "operator-stash"]).await;

        std::fs::write(temp.path().join("README.md"), "changed\n").unwrap();
        let stash_ref = git
            .stash_push(temp.path(), "sync-worktrees-auto-main-test")
            .await
            .unwrap()
            .expect("stash entry created");
        assert_eq!(stash_ref, "stash@{0}");
        assert!(!git.has_local_changes(temp.path()).await.unwrap());

        git.stash_pop(temp.path(), &stash_ref).await.unwrap();
        assert_eq!(std::fs::read_to_string(temp.path().join("README.md")).unwrap(), "changed\n");
        let remaining = Command::new("git")
            .args(["stash", "list"])
            .current_dir(temp.path())
            .output()
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&remaining.stdout).contains("operator-stash"));
    }

    #[test]
    fn test_find_stash_ref() {
        let list = "stash@{0}\tOn feat/x: sync-worktrees-auto-feat/x-20260101-120000\nstash@{1}\tOn main: wip\n";
        assert_eq!(
            find_stash_ref(list, "sync-worktrees-auto-feat/x-20260101-120000").as_deref(),
            Some("stash@{0}")
        );
        assert_eq!(find_stash_ref(list, "wip").as_deref(), Some("stash@{1}"));
        assert_eq!(find_stash_ref(list, "missing"), None);
        assert_eq!(find_stash_ref("", "anything"), None);
    }

    #[tokio::test]
    async fn test_git_merge_conflict_detected() {
        let temp = tempdir().unwrap();
        let dir = temp.path();
        setup_git_repo(dir).await;
        let git = Git::new(Duration::from_secs(30));

        run_git(dir, &["checkout", "-b", "feat/x"]).await;
        std::fs::write(dir.join("README.md"), "feature\n").unwrap();
        run_git(dir, &["commit", "-am", "feature"]).await;
        run_git(dir, &["checkout", "main"]).await;
        std::fs::write(dir.join("README.md"), "mainline\n").unwrap();
        run_git(dir, &["commit", "-am", "mainline"]).await;
        run_git(dir, &["checkout", "feat/x"]).await;

        let outcome = git.merge(dir, "main").await.unwrap();
        assert_eq!(outcome, MergeOutcome::Conflicts);
        assert_eq!(git.conflicted_files(dir).await.unwrap(), vec!["README.md".to_string()]);
    }

    #[tokio::test]
    async fn test_git_skip_worktree_flag() {
        let temp = tempdir().unwrap();
        setup_git_repo(temp.path()).await;
        let git = Git::new(Duration::from_secs(30));

        assert_eq!(git.skip_worktree(temp.path(), "README.md").await.unwrap(), Some(false));
        git.set_skip_worktree(temp.path(), "README.md", true).await.unwrap();
        assert_eq!(git.skip_worktree(temp.path(), "README.md").await.unwrap(), Some(true));
        assert_eq!(git.skip_worktree(temp.path(), "untracked.txt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_git_list_worktrees() {
        let temp = tempdir().unwrap();
        setup_git_repo(temp.path()).await;
        let git = Git::new(Duration::from_secs(30));

        let entries = git.list_worktrees(temp.path()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].branch.as_deref(), Some("main"));
        assert!(git.local_branch_exists(temp.path(), "main").await.unwrap());
        assert!(!git.local_branch_exists(temp.path(), "feat/none").await.unwrap());
    }
}
