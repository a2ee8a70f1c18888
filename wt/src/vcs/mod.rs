//! External tool capabilities
//!
//! Version control, the worktree registry, background services, the package
//! manager and the upstream change lookup each sit behind a narrow async trait.
//! Real implementations shell out with bounded timeouts; tests substitute
//! in-memory fakes.

mod command;
mod error;
mod git;
mod tools;

pub use command::{CommandOutput, run, run_checked};
pub use error::CommandError;
pub use git::{Git, parse_shortstat, parse_worktree_list};
pub use tools::{GhLookup, PackageScripts, SupabaseCli};

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

/// Result of pulling the mainline branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    UpToDate,
    Pulled,
}

/// Result of merging the mainline into a feature branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    UpToDate,
    Merged,
    /// The merge stopped with conflicts; the working tree is left mid-merge
    Conflicts,
}

/// Relation of a branch to its upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpstreamStatus {
    Detached,
    NoUpstream,
    Tracking { ahead: u32, behind: u32 },
}

impl fmt::Display for UpstreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detached => write!(f, "detached"),
            Self::NoUpstream => write!(f, "no upstream"),
            Self::Tracking { ahead, behind } => write!(f, "ahead {}, behind {}", ahead, behind),
        }
    }
}

/// One-line git status of a worktree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub branch: String,
    pub upstream: UpstreamStatus,
    pub files: usize,
    pub insertions: u32,
    pub deletions: u32,
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "branch {} | {} | ", self.branch, self.upstream)?;
        if self.files == 0 {
            write!(f, "clean")
        } else {
            write!(f, "files {}, +{}/-{}", self.files, self.insertions, self.deletions)
        }
    }
}

/// An entry of `git worktree list --porcelain`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub head: Option<String>,
    /// Short branch name; `None` when detached or bare
    pub branch: Option<String>,
    pub detached: bool,
    pub bare: bool,
}

/// Where a new worktree's branch comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchSource {
    /// Branch already exists locally
    Local,
    /// Branch exists only on the remote
    Remote,
    /// Create the branch from a base ref
    New { base: String },
}

/// Git operations on a single worktree
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Abbreviated HEAD; `HEAD` when detached
    async fn current_branch(&self, path: &Path) -> Result<String, CommandError>;

    /// Uncommitted changes to tracked files
    async fn has_local_changes(&self, path: &Path) -> Result<bool, CommandError>;

    /// Stash everything including untracked files
    ///
    /// Returns the ref of the stash entry carrying `message`, or `None` when
    /// git found nothing to save.
    async fn stash_push(&self, path: &Path, message: &str) -> Result<Option<String>, CommandError>;

    /// Apply and drop one specific stash entry
    async fn stash_pop(&self, path: &Path, stash_ref: &str) -> Result<(), CommandError>;

    async fn fetch(&self, path: &Path, remote: &str) -> Result<(), CommandError>;

    async fn pull(&self, path: &Path) -> Result<PullOutcome, CommandError>;

    async fn checkout_detached(&self, path: &Path, target: &str) -> Result<(), CommandError>;

    async fn head_commit(&self, path: &Path) -> Result<String, CommandError>;

    async fn merge(&self, path: &Path, branch: &str) -> Result<MergeOutcome, CommandError>;

    /// Files left unmerged by the last merge
    async fn conflicted_files(&self, path: &Path) -> Result<Vec<String>, CommandError>;

    /// Commits in `upstream` that HEAD does not have
    async fn commits_behind(&self, path: &Path, upstream: &str) -> Result<u32, CommandError>;

    /// Skip-worktree flag of a tracked file; `None` when the file is untracked
    async fn skip_worktree(&self, path: &Path, file: &str) -> Result<Option<bool>, CommandError>;

    async fn set_skip_worktree(&self, path: &Path, file: &str, enabled: bool) -> Result<(), CommandError>;

    async fn status_summary(&self, path: &Path) -> Result<StatusSummary, CommandError>;
}

/// Repository-level worktree bookkeeping
#[async_trait]
pub trait WorktreeRegistry: Send + Sync {
    async fn list_worktrees(&self, repo: &Path) -> Result<Vec<WorktreeEntry>, CommandError>;

    /// Root of the worktree containing `path`
    async fn toplevel(&self, path: &Path) -> Result<PathBuf, CommandError>;

    async fn local_branch_exists(&self, repo: &Path, branch: &str) -> Result<bool, CommandError>;

    async fn remote_branch_exists(&self, repo: &Path, remote: &str, branch: &str) -> Result<bool, CommandError>;

    async fn add_worktree(
        &self,
        repo: &Path,
        path: &Path,
        branch: &str,
        source: &BranchSource,
    ) -> Result<(), CommandError>;

    async fn remove_worktree(&self, repo: &Path, path: &Path) -> Result<(), CommandError>;

    async fn prune(&self, repo: &Path) -> Result<(), CommandError>;
}

/// Local background services (database, API, mail)
#[async_trait]
pub trait ServiceRuntime: Send + Sync {
    async fn stop(&self, path: &Path) -> Result<(), CommandError>;

    async fn start(&self, path: &Path) -> Result<(), CommandError>;

    /// Remove container volumes labelled with `project_id`; returns how many went
    async fn remove_volumes(&self, project_id: &str) -> Result<usize, CommandError>;
}

/// Dependency installs and project scripts
#[async_trait]
pub trait PackageManager: Send + Sync {
    async fn install(&self, path: &Path) -> Result<(), CommandError>;

    async fn run_script(&self, path: &Path, script: &str, timeout: Duration) -> Result<(), CommandError>;
}

/// Upstream code-review lookup
#[async_trait]
pub trait ChangeLookup: Send + Sync {
    /// Number of an already-merged change whose head is `branch`
    async fn merged_change(&self, branch: &str) -> Result<Option<u64>, CommandError>;
}
