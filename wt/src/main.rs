//! pinpoint-wt - per-branch worktree manager
//!
//! CLI entry point for provisioning, regenerating, syncing, and removing
//! worktrees.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use pinpoint_wt::cli::{Cli, Command, generate_after_help, get_log_path};
use pinpoint_wt::config::Config;
use pinpoint_wt::report::SyncReportBuilder;
use pinpoint_wt::sync::{Severity, SyncError, SyncOptions, Toolbox, WorktreeState, WorktreeSyncOrchestrator};
use pinpoint_wt::vcs::BranchSource;
use pinpoint_wt::worktree::{Regenerated, WorktreeManager, render_table};

const RULE_WIDTH: usize = 68;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// Human-facing output; moves to stderr when stdout carries JSON
#[derive(Debug, Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn say(&self, message: impl Display) {
        if self.json {
            eprintln!("{}", message);
        } else {
            println!("{}", message);
        }
    }

    fn blank(&self) {
        self.say("");
    }

    fn fail(&self, error: &dyn std::error::Error) -> ExitCode {
        self.say(format!("{} {}", "❌ Error:".red().bold(), error));
        if let Some(source) = error.source() {
            self.say(format!("   {}", source));
        }
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let tools = Toolbox::from_config(&config);
    let repo_root = match tools.registry.toplevel(&cwd).await {
        Ok(root) => root,
        Err(e) => {
            warn!("Not inside a git worktree, using {}: {}", cwd.display(), e);
            cwd.clone()
        }
    };
    info!(repo_root = %repo_root.display(), "pinpoint-wt started");

    let manager = WorktreeManager::new(config.clone(), &repo_root, tools.clone())?;
    let update_path = cli.command.update_path();

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Create { branch, base, json } => {
            cmd_create(&config, &manager, &branch, base.as_deref(), Output { json }).await
        }
        Command::List => cmd_list(&manager).await,
        Command::Remove { branch, json } => cmd_remove(&manager, &branch, Output { json }).await,
        Command::Sync { all } => cmd_sync(&manager, &repo_root, all).await,
        Command::Update {
            worktree_path,
            path,
            all,
            dry_run,
            validate,
            json,
        } => {
            let out = Output { json };
            if path.is_some() && worktree_path.is_some() {
                out.say("Note: Both --path and positional path provided; using --path");
            }
            let options = SyncOptions { dry_run, validate };
            let request = UpdateRequest {
                path: update_path,
                all,
                options,
            };
            cmd_update(&config, &manager, &tools, &repo_root, request, out).await
        }
    }
}

/// Create an ephemeral worktree
async fn cmd_create(
    config: &Config,
    manager: &WorktreeManager,
    branch: &str,
    base: Option<&str>,
    out: Output,
) -> Result<ExitCode> {
    out.say(format!("🌿 Creating ephemeral worktree for branch: {}", branch));

    let created = match manager.create(branch, base).await {
        Ok(created) => created,
        Err(e) => return Ok(out.fail(&e)),
    };
    let ports = &created.assignment;

    out.say(format!(
        "  🔌 Allocated ports: Next.js={}, API={}, DB={}",
        ports.nextjs_port(),
        ports.api_port(),
        ports.db_port()
    ));
    match &created.source {
        BranchSource::Local => out.say(format!("  📂 Created worktree for existing local branch: {}", branch)),
        BranchSource::Remote => out.say(format!("  📂 Created worktree for existing remote branch: {}", branch)),
        BranchSource::New { base } => out.say(format!("  📂 Created worktree with new branch (from {})", base)),
    }
    out.say(format!("  ⚙️  Generated {}", config.paths.config_file.display()));
    out.say(format!("  📝 Generated {}", config.paths.env_file.display()));
    if let Some(warning) = &created.install_warning {
        out.say(format!("  {} dependency install failed: {}", "⚠️  Warning:".yellow(), warning));
    } else {
        out.say("  📦 Dependencies installed");
    }

    out.blank();
    out.say("✅ Ephemeral worktree created successfully!".green().bold());
    out.blank();
    out.say(format!("   Path:      {}", created.path.display()));
    out.say(format!("   Branch:    {}", created.branch));
    out.say(format!("   Next.js:   http://localhost:{}", ports.nextjs_port()));
    out.say(format!("   Supabase:  http://localhost:{}", ports.api_port()));
    out.blank();
    out.say("   Next steps:");
    out.say(format!("   1. cd {}", created.path.display()));
    out.say(format!("   2. {} start", config.commands.service_cli));
    out.say(format!("   3. {} run dev", config.commands.package_manager));
    out.blank();

    if out.json {
        let json = serde_json::json!({
            "path": created.path,
            "branch": created.branch,
            "nextjs_port": ports.nextjs_port(),
            "api_port": ports.api_port(),
        });
        println!("{}", serde_json::to_string(&json)?);
    }
    Ok(ExitCode::SUCCESS)
}

/// List worktrees with their port offsets
async fn cmd_list(manager: &WorktreeManager) -> Result<ExitCode> {
    let rows = manager.list().await.context("Failed to list worktrees")?;
    println!();
    print!("{}", render_table(&rows));
    println!();
    Ok(ExitCode::SUCCESS)
}

/// Remove an ephemeral worktree and clean up after it
async fn cmd_remove(manager: &WorktreeManager, branch: &str, out: Output) -> Result<ExitCode> {
    let removed = match manager.remove(branch).await {
        Ok(removed) => removed,
        Err(e) => return Ok(out.fail(&e)),
    };

    out.say(format!("🗑️  Removed ephemeral worktree: {}", branch));
    out.say("  🛑 Services stopped");
    if removed.volumes_removed > 0 {
        out.say(format!(
            "  🐳 Removed {} volume(s) for project: {}",
            removed.volumes_removed, removed.project_id
        ));
    } else {
        out.say(format!("  🐳 No volumes found for project: {}", removed.project_id));
    }
    for warning in &removed.warnings {
        out.say(format!("  {} {}", "⚠️  Warning:".yellow(), warning));
    }

    out.blank();
    out.say("✅ Worktree removed successfully!".green().bold());
    out.say(format!(
        "   Branch '{0}' preserved (delete manually with: git branch -d -- '{0}' (or: git branch -D -- '{0}' to force))",
        branch
    ));
    out.blank();

    if out.json {
        println!("{}", serde_json::json!({ "removed": true }));
    }
    Ok(ExitCode::SUCCESS)
}

/// Regenerate config and env files
async fn cmd_sync(manager: &WorktreeManager, current: &Path, all: bool) -> Result<ExitCode> {
    let paths = if all {
        let paths = manager.worktree_paths().await.context("Failed to list worktrees")?;
        println!("🔄 Syncing {} worktree(s)...", paths.len());
        paths
    } else {
        println!("🔄 Syncing current worktree...");
        vec![current.to_path_buf()]
    };

    let mut failed = 0usize;
    for path in &paths {
        println!("\n  {}:", dir_name(path));
        match manager.regenerate(path).await {
            Ok(Regenerated::Written { assignment }) => {
                println!("    ✅ config.toml (API={})", assignment.api_port());
                println!("    ✅ .env.local (Port={}, user keys preserved)", assignment.nextjs_port());
            }
            Ok(Regenerated::NoTemplate) => println!("    {} No template found", "⚠️  Skipping:".yellow()),
            Err(e) => {
                failed += 1;
                println!("    {} {}", "❌".red(), e);
            }
        }
    }

    println!();
    if failed > 0 {
        println!("{} {} worktree(s) failed to sync", "❌ Error:".red().bold(), failed);
        println!();
        return Ok(ExitCode::FAILURE);
    }
    println!("{}", "✅ Sync complete!".green().bold());
    println!();
    Ok(ExitCode::SUCCESS)
}

struct UpdateRequest {
    path: Option<PathBuf>,
    all: bool,
    options: SyncOptions,
}

/// Orchestrated sync of one or all worktrees, with report
async fn cmd_update(
    config: &Config,
    manager: &WorktreeManager,
    tools: &Toolbox,
    repo_root: &Path,
    request: UpdateRequest,
    out: Output,
) -> Result<ExitCode> {
    out.say("🔄 PinPoint Worktree Sync");
    out.blank();

    let orchestrator = WorktreeSyncOrchestrator::new(config.clone(), tools.clone(), request.options);
    out.say("ℹ️  Running pre-flight checks...");
    let main = match orchestrator.preflight(repo_root).await {
        Ok(main) => main,
        Err(SyncError::MainBehind { path, behind, upstream }) => {
            out.say(format!(
                "{} Main worktree is {} commit(s) behind {}!",
                "❌".red(),
                behind,
                upstream
            ));
            out.blank();
            out.say("Main must be up-to-date before syncing other worktrees.");
            out.blank();
            out.say("To fix:");
            out.say(format!("  cd {}", path.display()));
            out.say(format!("  git pull {} {}", config.git.remote, config.git.main_branch));
            out.blank();
            out.say("Then re-run this command.");
            return Ok(ExitCode::FAILURE);
        }
    };
    match (&main, request.options.dry_run) {
        (Some(_), true) => out.say("[DRY-RUN] Would check if main is behind origin"),
        (Some(_), false) => out.say("✅ Main worktree is up to date".green()),
        (None, _) => debug!("cmd_update: no main worktree found"),
    }

    let paths = if request.all {
        manager.worktree_paths().await.context("Failed to list worktrees")?
    } else {
        let path = match request.path {
            Some(path) => tools.registry.toplevel(&path).await.unwrap_or(path),
            None => repo_root.to_path_buf(),
        };
        vec![path]
    };

    let mut states: Vec<WorktreeState> = Vec::with_capacity(paths.len());
    for (path, target) in manager.sync_targets(&paths, main.as_deref()).await {
        let target = match target {
            Ok(target) => target,
            Err(e) => {
                out.say(format!("Error: {}: {}", path.display(), e));
                continue;
            }
        };

        out.blank();
        out.say("=".repeat(RULE_WIDTH));
        out.say(format!("Processing: {}", dir_name(&target.path)));
        out.say(format!("Path: {}", target.path.display()));
        out.say("=".repeat(RULE_WIDTH));

        let state = orchestrator.sync_worktree(&target).await;
        narrate(&state, out);
        states.push(state);
    }

    let report = SyncReportBuilder::new(request.options.dry_run)
        .package_manager(config.commands.package_manager.clone())
        .build(&states);
    out.blank();
    out.say(&report.text);

    if out.json {
        let json = serde_json::json!({
            "rollup": report.rollup,
            "worktrees": states,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    }

    info!(?report.rollup, "Update finished");
    if report.rollup.has_errors() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn narrate(state: &WorktreeState, out: Output) {
    out.say(format!("  Config: {}", state.config_messages.join(" | ")));
    for action in &state.actions {
        out.say(format!("  {}", action));
    }
    if let Some(message) = &state.merge_message {
        out.say(format!("  Merge: {}", message));
    }
    let status = state.overall_status();
    let label = match status {
        Severity::Success => status.as_str().green(),
        Severity::Warning => status.as_str().yellow(),
        Severity::Error => status.as_str().red(),
    };
    out.say(format!("  Result: {} {}", status.icon(), label));
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
