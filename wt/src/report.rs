//! Sync report rendering
//!
//! Turns the per-worktree states of one run into the operator-facing text
//! report and a machine-readable severity rollup.

use std::fmt::Write as _;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::debug;

use crate::sync::{Severity, WorktreeState};

const RULE_WIDTH: usize = 68;

/// Per-severity counts and the worst severity seen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityRollup {
    pub success: usize,
    pub warning: usize,
    pub error: usize,
    pub overall: Severity,
}

impl SeverityRollup {
    pub fn from_states(states: &[WorktreeState]) -> Self {
        let mut rollup = Self::default();
        for state in states {
            let status = state.overall_status();
            match status {
                Severity::Success => rollup.success += 1,
                Severity::Warning => rollup.warning += 1,
                Severity::Error => rollup.error += 1,
            }
            rollup.overall = rollup.overall.max(status);
        }
        rollup
    }

    pub fn total(&self) -> usize {
        self.success + self.warning + self.error
    }

    pub fn has_errors(&self) -> bool {
        self.error > 0
    }
}

/// Rendered report for one run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub text: String,
    pub rollup: SeverityRollup,
}

pub struct SyncReportBuilder {
    dry_run: bool,
    package_manager: String,
    executed_at: DateTime<Local>,
}

impl SyncReportBuilder {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            package_manager: "npm".to_string(),
            executed_at: Local::now(),
        }
    }

    /// Program named in the next-steps dev server hint
    pub fn package_manager(mut self, program: impl Into<String>) -> Self {
        self.package_manager = program.into();
        self
    }

    pub fn executed_at(mut self, at: DateTime<Local>) -> Self {
        self.executed_at = at;
        self
    }

    pub fn build(&self, states: &[WorktreeState]) -> SyncReport {
        debug!(count = states.len(), dry_run = self.dry_run, "SyncReportBuilder::build: called");
        let rollup = SeverityRollup::from_states(states);
        let mut out = String::new();

        self.header(&mut out, states.len());
        summary(&mut out, &rollup);
        details(&mut out, states);
        recovery(&mut out, states);
        if states.iter().any(|s| s.services_restarted) {
            self.next_steps(&mut out);
        }
        out.push('\n');

        SyncReport { text: out, rollup }
    }

    fn header(&self, out: &mut String, count: usize) {
        let mode = if self.dry_run { "DRY-RUN" } else { "NORMAL" };
        let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
        let _ = writeln!(out, "🔄 PinPoint Worktree Sync Report");
        let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
        out.push('\n');
        let _ = writeln!(out, "Execution: {}", self.executed_at.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "Mode: {}", mode);
        let _ = writeln!(out, "Worktrees: {} processed", count);
    }

    fn next_steps(&self, out: &mut String) {
        section(out, "📝 NEXT STEPS");
        out.push('\n');
        let _ = writeln!(out, "For worktrees with restarted services:");
        let _ = writeln!(out, "  1. Check service URLs and keys with 'supabase status'");
        let _ = writeln!(out, "  2. Test: {} run dev", self.package_manager);
        let _ = writeln!(out, "  3. Verify correct ports in browser");
    }
}

fn section(out: &mut String, title: &str) {
    out.push('\n');
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
}

fn summary(out: &mut String, rollup: &SeverityRollup) {
    section(out, "📊 OVERALL SUMMARY");
    out.push('\n');
    let _ = writeln!(out, "✅ Success:  {} worktree(s)", rollup.success);
    let _ = writeln!(out, "⚠️  Warnings: {} worktree(s)", rollup.warning);
    let _ = writeln!(out, "❌ Errors:   {} worktree(s)", rollup.error);
}

fn details(out: &mut String, states: &[WorktreeState]) {
    section(out, "📋 WORKTREE DETAILS");
    for state in states {
        let status = state.overall_status();
        let config = if state.config_messages.is_empty() {
            "Unknown".to_string()
        } else {
            state.config_messages.join(" | ")
        };

        out.push('\n');
        let _ = writeln!(out, "{} {} ({})", status.icon(), state.name, status);
        let _ = writeln!(out, "   Path: {}", state.path.display());
        let _ = writeln!(out, "   Config: {}", config);
        let _ = writeln!(out, "   Merge: {}", state.merge_message.as_deref().unwrap_or("Unknown"));
        let _ = writeln!(out, "   Status: {}", state.git_status.as_deref().unwrap_or("Unknown"));
        if state.conflicts_present {
            let _ = writeln!(out, "   ⚠️  CONFLICTS PRESENT - See recovery section below");
        }
    }
}

fn recovery(out: &mut String, states: &[WorktreeState]) {
    if states.iter().all(|s| s.recovery_commands.is_empty()) {
        return;
    }
    section(out, "🔧 RECOVERY ACTIONS NEEDED");
    for state in states.iter().filter(|s| !s.recovery_commands.is_empty()) {
        out.push('\n');
        let _ = writeln!(out, "{}:", state.name);
        for recipe in &state.recovery_commands {
            let _ = writeln!(out, "{}", recipe);
        }
    }
}
