//! Multi-phase worktree synchronization
//!
//! Each worktree goes through the phases in order: quiesce services,
//! reconcile config, capture branch and stash, reconcile the branch with the
//! mainline (classifying any conflicts), restore the stash, resync
//! dependencies and services, and optionally validate. Every outcome lands in
//! the worktree's [`WorktreeState`]; nothing here aborts a batch.

use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::recovery::{RecipeContext, classify_conflicts, conflict_recipe, stash_pop_recipe};
use super::state::{MergeStatus, Severity, WorktreeState};
use crate::config::Config;
use crate::envfile;
use crate::ports::PortAssignment;
use crate::template;
use crate::vcs::{
    ChangeLookup, GhLookup, Git, MergeOutcome, PackageManager, PackageScripts, PullOutcome, ServiceRuntime,
    SupabaseCli, VersionControl, WorktreeRegistry,
};
use crate::worktree::WorktreeMetadata;

/// Sync errors that stop a batch before it starts
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Main worktree is {behind} commit(s) behind {upstream}")]
    MainBehind {
        path: PathBuf,
        behind: u32,
        upstream: String,
    },
}

/// The external tools a sync run drives
#[derive(Clone)]
pub struct Toolbox {
    pub vcs: Arc<dyn VersionControl>,
    pub registry: Arc<dyn WorktreeRegistry>,
    pub services: Arc<dyn ServiceRuntime>,
    pub packages: Arc<dyn PackageManager>,
    pub changes: Arc<dyn ChangeLookup>,
}

impl Toolbox {
    /// Real tools: git, the service CLI, the package manager, and `gh`
    pub fn from_config(config: &Config) -> Self {
        let git = Arc::new(Git::new(config.timeouts.git()));
        Self {
            vcs: git.clone(),
            registry: git,
            services: Arc::new(SupabaseCli::new(&config.commands, &config.timeouts)),
            packages: Arc::new(PackageScripts::new(&config.commands, &config.timeouts)),
            changes: Arc::new(GhLookup::new(config.git.repo_slug.clone(), config.timeouts.git())),
        }
    }
}

/// Run-wide switches
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Narrate mutating actions instead of performing them
    pub dry_run: bool,
    /// Run the check script after a successful sync
    pub validate: bool,
}

/// One worktree to sync
#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub path: PathBuf,
    pub assignment: PortAssignment,
    /// The worktree checked out on the mainline branch
    pub is_main: bool,
}

/// Drives worktrees through the sync phases
pub struct WorktreeSyncOrchestrator {
    config: Config,
    tools: Toolbox,
    options: SyncOptions,
}

impl WorktreeSyncOrchestrator {
    pub fn new(config: Config, tools: Toolbox, options: SyncOptions) -> Self {
        debug!(?options, "WorktreeSyncOrchestrator::new: called");
        Self { config, tools, options }
    }

    pub fn options(&self) -> SyncOptions {
        self.options
    }

    /// Path of the worktree checked out on the mainline branch, if any
    pub async fn main_worktree(&self, repo: &Path) -> Option<PathBuf> {
        debug!(?repo, "WorktreeSyncOrchestrator::main_worktree: called");
        match self.tools.registry.list_worktrees(repo).await {
            Ok(entries) => entries
                .into_iter()
                .find(|e| e.branch.as_deref() == Some(self.config.git.main_branch.as_str()))
                .map(|e| e.path)
                .filter(|p| p.exists()),
            Err(e) => {
                warn!("Failed to list worktrees: {}", e);
                None
            }
        }
    }

    /// Refuse a batch while the mainline worktree is behind its remote
    ///
    /// Returns the mainline worktree path when one was found. A fetch or
    /// count failure does not block the batch.
    pub async fn preflight(&self, repo: &Path) -> Result<Option<PathBuf>, SyncError> {
        debug!(?repo, "WorktreeSyncOrchestrator::preflight: called");
        let Some(main_path) = self.main_worktree(repo).await else {
            debug!("WorktreeSyncOrchestrator::preflight: no main worktree found");
            return Ok(None);
        };
        if self.options.dry_run {
            debug!("WorktreeSyncOrchestrator::preflight: dry run, skipping behind check");
            return Ok(Some(main_path));
        }

        let git = &self.config.git;
        if let Err(e) = self.tools.vcs.fetch(&main_path, &git.remote).await {
            warn!("Pre-flight fetch failed, continuing: {}", e);
            return Ok(Some(main_path));
        }
        let upstream = git.upstream_main();
        match self.tools.vcs.commits_behind(&main_path, &upstream).await {
            Ok(0) => Ok(Some(main_path)),
            Ok(behind) => {
                warn!(behind, "Main worktree is behind {}", upstream);
                Err(SyncError::MainBehind {
                    path: main_path,
                    behind,
                    upstream,
                })
            }
            Err(e) => {
                warn!("Pre-flight behind check failed, continuing: {}", e);
                Ok(Some(main_path))
            }
        }
    }

    /// Sync every target in order; one failure never stops the rest
    pub async fn sync_all(&self, targets: &[SyncTarget]) -> Vec<WorktreeState> {
        debug!(count = targets.len(), "WorktreeSyncOrchestrator::sync_all: called");
        let mut states = Vec::with_capacity(targets.len());
        for target in targets {
            states.push(self.sync_worktree(target).await);
        }
        states
    }

    /// Run all phases for one worktree
    pub async fn sync_worktree(&self, target: &SyncTarget) -> WorktreeState {
        let name = target
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| target.assignment.name.clone());
        info!(%name, path = ?target.path, "Syncing worktree");
        let mut state = WorktreeState::new(target.path.clone(), name, target.assignment.clone());

        self.quiesce(&mut state).await;
        self.reconcile_config(&mut state, target.is_main).await;

        if self.capture_and_stash(&mut state).await.is_continue()
            && self.reconcile_branch(&mut state).await.is_continue()
        {
            self.restore_stash(&mut state).await;
            self.resync_dependencies(&mut state).await;
            if self.options.validate {
                self.validate(&mut state).await;
            }
        }

        self.capture_status(&mut state).await;
        info!(name = %state.name, status = %state.overall_status(), "Worktree sync finished");
        state
    }

    fn would(&self, state: &mut WorktreeState, action: impl AsRef<str>) {
        let line = format!("[DRY-RUN] Would {}", action.as_ref());
        debug!(%line, "WorktreeSyncOrchestrator::would: dry run");
        state.actions.push(line);
    }

    fn config_path(&self, state: &WorktreeState) -> PathBuf {
        state.path.join(&self.config.paths.config_file)
    }

    /// Phase 1: stop background services; failures are ignored
    async fn quiesce(&self, state: &mut WorktreeState) {
        debug!(name = %state.name, "WorktreeSyncOrchestrator::quiesce: called");
        if !self.config_path(state).exists() {
            return;
        }
        if self.options.dry_run {
            let name = state.name.clone();
            self.would(state, format!("stop services in {}", name));
            return;
        }
        if let Err(e) = self.tools.services.stop(&state.path).await {
            debug!(%e, "WorktreeSyncOrchestrator::quiesce: stop failed, ignoring");
        }
    }

    /// Phase 2: config artifact, env file, metadata record, skip-worktree flag
    async fn reconcile_config(&self, state: &mut WorktreeState, is_main: bool) {
        debug!(name = %state.name, is_main, "WorktreeSyncOrchestrator::reconcile_config: called");
        let paths = &self.config.paths;
        let config_path = self.config_path(state);

        if !config_path.exists() {
            warn!(path = ?config_path, "Config artifact missing");
            state.add_config_message(format!("{} missing", paths.config_file.display()));
            state.raise_severity(Severity::Error);
            return;
        }

        let content = match fs::read_to_string(&config_path) {
            Ok(content) => content,
            Err(e) => {
                state.add_config_message(format!("Failed to read {}: {}", paths.config_file.display(), e));
                state.raise_severity(Severity::Error);
                return;
            }
        };

        let drifts = template::drift(&content, &state.assignment);
        if drifts.is_empty() {
            state.add_config_message("config.toml validated");
        } else {
            let summary = drifts.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
            info!(name = %state.name, %summary, "Config drift detected");
            let backup = backup_path(&config_path);
            if self.options.dry_run {
                self.would(state, format!("back up {} to {}", config_path.display(), backup.display()));
                state.add_config_message(format!("Would fix: {}", summary));
                state.config_fixed = true;
                state.raise_severity(Severity::Warning);
            } else {
                let fixed = template::reconcile(&content, &state.assignment);
                let result = fs::copy(&config_path, &backup)
                    .map_err(|e| e.to_string())
                    .and_then(|_| template::write_protected(&config_path, &fixed).map_err(|e| e.to_string()));
                match result {
                    Ok(()) => {
                        state.add_config_message(format!("Fixed: {}", summary));
                        state.config_fixed = true;
                        state.raise_severity(Severity::Warning);
                    }
                    Err(e) => {
                        state.add_config_message(format!("Failed to fix config: {}", e));
                        state.raise_severity(Severity::Error);
                    }
                }
            }
        }

        self.regenerate_env(state);
        self.record_metadata(state);
        self.maintain_skip_worktree(state, is_main).await;
    }

    fn regenerate_env(&self, state: &mut WorktreeState) {
        let env_file = &self.config.paths.env_file;
        let env_path = state.path.join(env_file);
        let existing = fs::read_to_string(&env_path).ok();
        let merged = envfile::merge(existing.as_deref(), &state.assignment);
        if existing.as_deref() == Some(merged.as_str()) {
            debug!("WorktreeSyncOrchestrator::regenerate_env: env file current");
            return;
        }

        let verb = if existing.is_some() { "updated" } else { "created" };
        if self.options.dry_run {
            self.would(state, format!("write {}", env_path.display()));
            state.add_config_message(format!("{} would be {}", env_file.display(), verb));
            return;
        }
        match template::write_protected(&env_path, &merged) {
            Ok(()) => state.add_config_message(format!("{} {}", env_file.display(), verb)),
            Err(e) => {
                state.add_config_message(format!("Failed to write {}: {}", env_file.display(), e));
                state.raise_severity(Severity::Warning);
            }
        }
    }

    fn record_metadata(&self, state: &mut WorktreeState) {
        let metadata_path = state.path.join(&self.config.paths.metadata_file);
        if metadata_path.exists() {
            return;
        }
        if self.options.dry_run {
            self.would(state, format!("write {}", metadata_path.display()));
            return;
        }
        match WorktreeMetadata::new(state.assignment.clone()).save(&metadata_path) {
            Ok(()) => state.add_config_message("metadata recorded"),
            Err(e) => {
                warn!("Failed to write metadata: {:#}", e);
                state.add_config_message(format!("Failed to record metadata: {}", e));
                state.raise_severity(Severity::Warning);
            }
        }
    }

    async fn maintain_skip_worktree(&self, state: &mut WorktreeState, is_main: bool) {
        let file = self.config.paths.config_file_git_path();
        let flag = match self.tools.vcs.skip_worktree(&state.path, &file).await {
            Ok(Some(flag)) => flag,
            Ok(None) => {
                debug!("WorktreeSyncOrchestrator::maintain_skip_worktree: file untracked");
                return;
            }
            Err(e) => {
                debug!(%e, "WorktreeSyncOrchestrator::maintain_skip_worktree: lookup failed");
                return;
            }
        };

        // Main worktree: flag must be clear. Everywhere else: flag must be set.
        let wanted = !is_main;
        if flag == wanted {
            return;
        }
        let message = if wanted { "skip-worktree added" } else { "skip-worktree removed" };
        if self.options.dry_run {
            let name = state.name.clone();
            let verb = if wanted { "add skip-worktree to" } else { "remove skip-worktree from" };
            self.would(state, format!("{} {}", verb, name));
            state.add_config_message(message);
            return;
        }
        match self.tools.vcs.set_skip_worktree(&state.path, &file, wanted).await {
            Ok(()) => state.add_config_message(message),
            Err(e) => debug!(%e, "WorktreeSyncOrchestrator::maintain_skip_worktree: update failed"),
        }
    }

    /// Phase 3: record branch and local changes, stash when dirty
    async fn capture_and_stash(&self, state: &mut WorktreeState) -> ControlFlow<()> {
        debug!(name = %state.name, "WorktreeSyncOrchestrator::capture_and_stash: called");
        let vcs = &self.tools.vcs;

        let branch = match vcs.current_branch(&state.path).await {
            Ok(branch) => branch,
            Err(e) => {
                state.merge_message = Some(format!("Unable to determine branch: {}", e));
                state.raise_severity(Severity::Error);
                return ControlFlow::Break(());
            }
        };
        let has_changes = match vcs.has_local_changes(&state.path).await {
            Ok(changes) => changes,
            Err(e) => {
                state.merge_message = Some(format!("Unable to inspect local changes: {}", e));
                state.raise_severity(Severity::Error);
                return ControlFlow::Break(());
            }
        };
        state.branch = Some(branch.clone());
        state.has_local_changes = has_changes;
        state.actions.push(format!("Current branch: {}", branch));

        if !has_changes {
            return ControlFlow::Continue(());
        }

        let stash_name = format!("sync-worktrees-auto-{}-{}", branch, Local::now().format("%Y%m%d-%H%M%S"));
        if self.options.dry_run {
            self.would(state, format!("stash: {}", stash_name));
            return ControlFlow::Continue(());
        }
        match vcs.stash_push(&state.path, &stash_name).await {
            Ok(Some(stash_ref)) => {
                info!(%stash_name, %stash_ref, "Stashed local changes");
                state.stash_ref = Some(stash_ref);
                state.actions.push("Stashed uncommitted changes".to_string());
                ControlFlow::Continue(())
            }
            Ok(None) => {
                debug!(%stash_name, "WorktreeSyncOrchestrator::capture_and_stash: nothing was stashed");
                state.actions.push("Nothing to stash".to_string());
                ControlFlow::Continue(())
            }
            Err(e) => {
                state.merge_message = Some(format!("Failed to stash changes: {}", e));
                state.raise_severity(Severity::Error);
                ControlFlow::Break(())
            }
        }
    }

    /// Phase 4 (and 5 on conflicts): bring the branch up to the mainline
    async fn reconcile_branch(&self, state: &mut WorktreeState) -> ControlFlow<()> {
        let Some(branch) = state.branch.clone() else {
            return ControlFlow::Break(());
        };
        debug!(name = %state.name, %branch, "WorktreeSyncOrchestrator::reconcile_branch: called");
        let git = &self.config.git;

        if branch == "HEAD" {
            return self.reconcile_detached(state).await;
        }
        if branch == git.main_branch {
            return self.reconcile_mainline(state).await;
        }

        match self.tools.changes.merged_change(&branch).await {
            Ok(Some(number)) => {
                state.set_merge(
                    MergeStatus::Declined,
                    format!("Merged PR #{} found (manual checkout recommended)", number),
                );
                state.raise_severity(Severity::Warning);
                return ControlFlow::Continue(());
            }
            Ok(None) => {}
            Err(e) => debug!(%e, "WorktreeSyncOrchestrator::reconcile_branch: change lookup failed"),
        }

        match self.tools.vcs.head_commit(&state.path).await {
            Ok(sha) => state.pre_merge_sha = Some(sha),
            Err(e) => {
                state.merge_message = Some(format!("Unable to read HEAD: {}", e));
                state.raise_severity(Severity::Error);
                return ControlFlow::Continue(());
            }
        }

        if self.options.dry_run {
            self.would(state, format!("run: git merge {}", git.main_branch));
            state.set_merge(MergeStatus::Merged, format!("Would merge {}", git.main_branch));
            return ControlFlow::Continue(());
        }

        match self.tools.vcs.merge(&state.path, &git.main_branch).await {
            Ok(MergeOutcome::UpToDate) => {
                state.set_merge(MergeStatus::UpToDate, format!("Already up to date with {}", git.main_branch));
            }
            Ok(MergeOutcome::Merged) => {
                state.set_merge(MergeStatus::Merged, format!("Merged {} successfully", git.main_branch));
            }
            Ok(MergeOutcome::Conflicts) => self.record_conflicts(state).await,
            Err(e) => {
                warn!("Merge failed in {}: {}", state.name, e);
                state.merge_message = Some(format!("Merge failed: {}", e));
                state.raise_severity(Severity::Error);
            }
        }
        ControlFlow::Continue(())
    }

    async fn reconcile_detached(&self, state: &mut WorktreeState) -> ControlFlow<()> {
        let git = &self.config.git;
        if state.has_local_changes {
            state.set_merge(
                MergeStatus::Skipped,
                "Detached HEAD with outstanding changes - should be working on a branch",
            );
            state.raise_severity(Severity::Warning);
            return ControlFlow::Continue(());
        }

        let upstream = git.upstream_main();
        if self.options.dry_run {
            self.would(state, format!("run: git fetch {} && git checkout --detach {}", git.remote, upstream));
            state.set_merge(MergeStatus::Detached, format!("Would switch to {} detached", upstream));
            return ControlFlow::Continue(());
        }

        if let Err(e) = self.tools.vcs.fetch(&state.path, &git.remote).await {
            return self.network_failure(state, "Fetch", e);
        }
        if let Err(e) = self.tools.vcs.checkout_detached(&state.path, &upstream).await {
            state.merge_message = Some(format!("Checkout of {} failed: {}", upstream, e));
            state.raise_severity(Severity::Error);
            return ControlFlow::Break(());
        }
        state.set_merge(MergeStatus::Detached, format!("Switched to {} detached", upstream));
        ControlFlow::Continue(())
    }

    async fn reconcile_mainline(&self, state: &mut WorktreeState) -> ControlFlow<()> {
        let main = &self.config.git.main_branch;
        if state.has_local_changes {
            state.set_merge(
                MergeStatus::Skipped,
                format!("On {} with outstanding changes - should be working on a branch", main),
            );
            state.raise_severity(Severity::Warning);
            return ControlFlow::Continue(());
        }

        if self.options.dry_run {
            self.would(state, "run: git pull");
            state.set_merge(MergeStatus::Pulled, format!("Would pull {}", main));
            return ControlFlow::Continue(());
        }

        match self.tools.vcs.pull(&state.path).await {
            Ok(PullOutcome::UpToDate) => {
                state.set_merge(MergeStatus::UpToDate, "Main already up to date");
                ControlFlow::Continue(())
            }
            Ok(PullOutcome::Pulled) => {
                state.set_merge(MergeStatus::Pulled, "Main pulled successfully");
                ControlFlow::Continue(())
            }
            Err(e) => self.network_failure(state, "Pull", e),
        }
    }

    fn network_failure(&self, state: &mut WorktreeState, what: &str, error: impl std::fmt::Display) -> ControlFlow<()> {
        warn!("{} failed in {}: {}", what, state.name, error);
        state.merge_message = Some(format!("{} failed: {}", what, error));
        state.raise_severity(Severity::Error);
        ControlFlow::Break(())
    }

    /// Phase 5: classify the conflict and attach a recovery recipe
    async fn record_conflicts(&self, state: &mut WorktreeState) {
        debug!(name = %state.name, "WorktreeSyncOrchestrator::record_conflicts: called");
        state.conflicts_present = true;
        state.merge_status = Some(MergeStatus::Conflicts);
        state.raise_severity(Severity::Error);

        let files = match self.tools.vcs.conflicted_files(&state.path).await {
            Ok(files) => files,
            Err(e) => {
                debug!(%e, "WorktreeSyncOrchestrator::record_conflicts: conflicted file lookup failed");
                Vec::new()
            }
        };
        let config_file = self.config.paths.config_file_git_path();
        let kind = classify_conflicts(&files, &config_file);
        let pre_merge_sha = state.pre_merge_sha.clone().unwrap_or_else(|| "HEAD".to_string());
        let ctx = RecipeContext {
            path: &state.path,
            config_file: &config_file,
            main_branch: &self.config.git.main_branch,
            pre_merge_sha: &pre_merge_sha,
            resync_command: &self.config.commands.resync_command,
        };
        let (message, recipe) = conflict_recipe(&kind, &files, &ctx);

        warn!(name = %state.name, %message, "Merge conflicts");
        state.merge_message = Some(message);
        state.add_recovery_command(recipe);
    }

    /// Phase 6: re-apply the stash when the merge left no conflicts
    async fn restore_stash(&self, state: &mut WorktreeState) {
        let Some(stash_ref) = state.stash_ref.clone() else {
            return;
        };
        if state.conflicts_present {
            return;
        }
        debug!(name = %state.name, %stash_ref, "WorktreeSyncOrchestrator::restore_stash: called");
        if self.options.dry_run {
            self.would(state, format!("run: git stash pop {}", stash_ref));
            return;
        }
        match self.tools.vcs.stash_pop(&state.path, &stash_ref).await {
            Ok(()) => state.actions.push("Stash popped successfully".to_string()),
            Err(e) => {
                warn!("Stash pop failed in {}: {}", state.name, e);
                state.conflicts_present = true;
                state.raise_severity(Severity::Error);
                let recipe = stash_pop_recipe(&state.path);
                state.add_recovery_command(recipe);
                state.actions.push("Stash pop conflicts - left in conflicted state".to_string());
            }
        }
    }

    /// Phase 7: install dependencies, restart services, regenerate schema
    async fn resync_dependencies(&self, state: &mut WorktreeState) {
        if state.conflicts_present {
            state.actions.push("Skipped dependency sync (conflicts present)".to_string());
            return;
        }
        debug!(name = %state.name, "WorktreeSyncOrchestrator::resync_dependencies: called");
        let commands = &self.config.commands;
        let timeouts = &self.config.timeouts;
        let name = state.name.clone();

        if self.options.dry_run {
            self.would(
                state,
                format!("run: {} {} in {}", commands.package_manager, commands.install_args.join(" "), name),
            );
        } else if let Err(e) = self.tools.packages.install(&state.path).await {
            self.degrade(state, "Dependency install failed", e);
        } else {
            state.actions.push("Dependencies installed".to_string());
        }

        if !self.config_path(state).exists() {
            state.actions.push("Skipped service restart (no config artifact)".to_string());
        } else if !state.config_fixed {
            state.actions.push("Skipped service restart (config unchanged)".to_string());
        } else if self.options.dry_run {
            self.would(state, format!("restart services in {}", name));
        } else {
            self.restart_services(state).await;
        }

        if self.options.dry_run {
            self.would(state, format!("run: {} run {} in {}", commands.package_manager, commands.schema_script, name));
        } else if let Err(e) = self
            .tools
            .packages
            .run_script(&state.path, &commands.schema_script, timeouts.script())
            .await
        {
            self.degrade(state, "Schema regeneration failed", e);
        }
    }

    async fn restart_services(&self, state: &mut WorktreeState) {
        let services = &self.tools.services;
        if let Err(e) = services.stop(&state.path).await {
            debug!(%e, "WorktreeSyncOrchestrator::restart_services: stop failed, ignoring");
        }
        if let Err(e) = services.start(&state.path).await {
            self.degrade(state, "Service start failed", e);
            return;
        }
        state.services_restarted = true;
        state.actions.push("Services restarted".to_string());

        let commands = &self.config.commands;
        if let Err(e) = self
            .tools
            .packages
            .run_script(&state.path, &commands.db_reset_script, self.config.timeouts.script())
            .await
        {
            self.degrade(state, "Database reset failed", e);
        }
    }

    /// Phase 8: consolidated check script
    async fn validate(&self, state: &mut WorktreeState) {
        if state.conflicts_present {
            return;
        }
        debug!(name = %state.name, "WorktreeSyncOrchestrator::validate: called");
        let commands = &self.config.commands;
        if self.options.dry_run {
            self.would(state, format!("run: {} run {}", commands.package_manager, commands.check_script));
            return;
        }
        match self
            .tools
            .packages
            .run_script(&state.path, &commands.check_script, self.config.timeouts.validation())
            .await
        {
            Ok(()) => state.actions.push("Validation passed".to_string()),
            Err(e) => self.degrade(state, "Validation failed", e),
        }
    }

    fn degrade(&self, state: &mut WorktreeState, what: &str, error: impl std::fmt::Display) {
        warn!("{} in {}: {}", what, state.name, error);
        state.actions.push(format!("{}: {}", what, error));
        state.raise_severity(Severity::Warning);
    }

    async fn capture_status(&self, state: &mut WorktreeState) {
        match self.tools.vcs.status_summary(&state.path).await {
            Ok(summary) => state.set_git_status(&summary),
            Err(e) => state.git_status = Some(format!("Unable to get status: {}", e)),
        }
    }
}

/// `<config>.bak.<YYYYmmdd-HHMMSS>` next to the artifact
fn backup_path(config_path: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let mut name = config_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".bak.{}", stamp));
    config_path.with_file_name(name)
}
