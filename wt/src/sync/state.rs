//! Per-worktree sync state

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::ports::PortAssignment;
use crate::vcs::StatusSummary;

/// Outcome severity; only ever escalates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Success => "✅",
            Self::Warning => "⚠️ ",
            Self::Error => "❌",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the branch during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStatus {
    Merged,
    UpToDate,
    Conflicts,
    Skipped,
    Pulled,
    Detached,
    Declined,
}

/// Everything recorded about one worktree during one run
#[derive(Debug, Clone, Serialize)]
pub struct WorktreeState {
    pub path: PathBuf,
    pub name: String,
    pub assignment: PortAssignment,
    pub config_fixed: bool,
    pub config_messages: Vec<String>,
    pub branch: Option<String>,
    pub has_local_changes: bool,
    pub stash_ref: Option<String>,
    pub pre_merge_sha: Option<String>,
    pub merge_status: Option<MergeStatus>,
    pub merge_message: Option<String>,
    pub conflicts_present: bool,
    pub recovery_commands: Vec<String>,
    pub services_restarted: bool,
    pub git_status: Option<String>,
    /// Progress narration, including `[DRY-RUN] Would ...` lines
    pub actions: Vec<String>,
    overall_status: Severity,
}

impl WorktreeState {
    pub fn new(path: PathBuf, name: impl Into<String>, assignment: PortAssignment) -> Self {
        Self {
            path,
            name: name.into(),
            assignment,
            config_fixed: false,
            config_messages: Vec::new(),
            branch: None,
            has_local_changes: false,
            stash_ref: None,
            pre_merge_sha: None,
            merge_status: None,
            merge_message: None,
            conflicts_present: false,
            recovery_commands: Vec::new(),
            services_restarted: false,
            git_status: None,
            actions: Vec::new(),
            overall_status: Severity::Success,
        }
    }

    pub fn overall_status(&self) -> Severity {
        self.overall_status
    }

    /// Raise severity to at least `level`; never lowers it
    pub fn raise_severity(&mut self, level: Severity) {
        self.overall_status = self.overall_status.max(level);
    }

    /// Alias of [`raise_severity`](Self::raise_severity)
    pub fn update_status(&mut self, level: Severity) {
        self.raise_severity(level);
    }

    pub fn add_config_message(&mut self, message: impl Into<String>) {
        self.config_messages.push(message.into());
    }

    pub fn add_recovery_command(&mut self, recipe: impl Into<String>) {
        self.recovery_commands.push(recipe.into());
    }

    pub fn set_merge(&mut self, status: MergeStatus, message: impl Into<String>) {
        self.merge_status = Some(status);
        self.merge_message = Some(message.into());
    }

    pub fn set_git_status(&mut self, summary: &StatusSummary) {
        self.git_status = Some(summary.to_string());
    }
}
