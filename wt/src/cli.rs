//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// pinpoint-wt - per-branch worktrees with collision-free ports
#[derive(Parser)]
#[command(
    name = "pinpoint-wt",
    about = "Manage ephemeral worktrees with automatic port allocation and mainline sync",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an ephemeral worktree with its own ports
    Create {
        /// Branch name (e.g. feat/new-feature)
        branch: String,

        /// Base revision for a new branch (default: <remote>/<main>)
        #[arg(short, long)]
        base: Option<String>,

        /// Machine-readable JSON on stdout; human output goes to stderr
        #[arg(long)]
        json: bool,
    },

    /// List all worktrees with their port assignments
    List,

    /// Remove an ephemeral worktree and its container volumes
    Remove {
        /// Branch name of the worktree to remove
        branch: String,

        /// Machine-readable JSON on stdout; human output goes to stderr
        #[arg(long)]
        json: bool,
    },

    /// Regenerate config and env files
    Sync {
        /// Regenerate every worktree instead of the current one
        #[arg(short, long)]
        all: bool,
    },

    /// Bring worktrees up to date with the mainline and report
    Update {
        /// Worktree path (alternative to --path)
        #[arg(value_name = "PATH")]
        worktree_path: Option<PathBuf>,

        /// Process a specific worktree; wins over the positional path
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Process all worktrees
        #[arg(short, long)]
        all: bool,

        /// Show actions without making changes
        #[arg(long)]
        dry_run: bool,

        /// Run the check script after syncing
        #[arg(long)]
        validate: bool,

        /// Machine-readable JSON on stdout; the report goes to stderr
        #[arg(long)]
        json: bool,
    },
}

impl Command {
    /// The single worktree `update` should process; `--path` wins
    pub fn update_path(&self) -> Option<PathBuf> {
        match self {
            Self::Update {
                worktree_path, path, ..
            } => path.clone().or_else(|| worktree_path.clone()),
            _ => None,
        }
    }
}

/// Result of checking a required tool
pub struct ToolCheck {
    pub name: &'static str,
    pub available: bool,
    pub version: Option<String>,
}

impl ToolCheck {
    /// Check if a tool is available and get its version
    pub fn check(name: &'static str, version_args: &[&str]) -> Self {
        debug!(name, ?version_args, "ToolCheck::check: called");
        match std::process::Command::new(name).args(version_args).output() {
            Ok(output) if output.status.success() => Self {
                name,
                available: true,
                version: Some(parse_version(&String::from_utf8_lossy(&output.stdout))),
            },
            _ => Self {
                name,
                available: false,
                version: None,
            },
        }
    }
}

/// First version-like token of a `--version` output
fn parse_version(output: &str) -> String {
    for word in output.split_whitespace() {
        let word = word.trim_start_matches('v');
        if word.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            let version: String = word.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
            if !version.is_empty() {
                return version;
            }
        }
    }
    "unknown".to_string()
}

/// Check all tools the commands shell out to
pub fn check_required_tools() -> Vec<ToolCheck> {
    debug!("check_required_tools: called");
    vec![
        ToolCheck::check("git", &["--version"]),
        ToolCheck::check("supabase", &["--version"]),
        ToolCheck::check("docker", &["--version"]),
        ToolCheck::check("npm", &["--version"]),
        ToolCheck::check("gh", &["--version"]),
    ]
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pinpoint-wt")
        .join("logs")
        .join("pinpoint-wt.log")
}

/// Generate the after_help text with tool checks and the log location
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let mut help = String::new();

    help.push_str("Required Tools:\n");
    for tool in check_required_tools() {
        let icon = if tool.available { "\u{2705}" } else { "\u{274C}" };
        let version = tool.version.as_deref().unwrap_or("not found");
        help.push_str(&format!("  {} {:<10} {}\n", icon, tool.name, version));
    }

    help.push('\n');
    help.push_str("Examples:\n");
    help.push_str("  pinpoint-wt create feat/new-feature              Create worktree from origin/main\n");
    help.push_str("  pinpoint-wt create feat/fix --base feat/parent   Create worktree from a specific branch\n");
    help.push_str("  pinpoint-wt sync --all                           Regenerate config for all worktrees\n");
    help.push_str("  pinpoint-wt update --all --dry-run               Preview a sync of every worktree\n");

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));
    help
}
