//! Service CLI, package manager and change lookup backed by external programs

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::command::{run, run_checked};
use super::error::CommandError;
use super::{ChangeLookup, PackageManager, ServiceRuntime};
use crate::config::{CommandsConfig, TimeoutsConfig};

/// Supabase CLI plus the container runtime for volume cleanup
#[derive(Debug, Clone)]
pub struct SupabaseCli {
    program: String,
    container_program: String,
    start_timeout: Duration,
    stop_timeout: Duration,
}

impl SupabaseCli {
    pub fn new(commands: &CommandsConfig, timeouts: &TimeoutsConfig) -> Self {
        Self {
            program: commands.service_cli.clone(),
            container_program: commands.container_cli.clone(),
            start_timeout: timeouts.service_start(),
            stop_timeout: timeouts.service_stop(),
        }
    }
}

#[async_trait]
impl ServiceRuntime for SupabaseCli {
    async fn stop(&self, path: &Path) -> Result<(), CommandError> {
        debug!(?path, "SupabaseCli::stop: called");
        run_checked(&self.program, &["stop"], Some(path), self.stop_timeout).await?;
        Ok(())
    }

    async fn start(&self, path: &Path) -> Result<(), CommandError> {
        debug!(?path, "SupabaseCli::start: called");
        run_checked(&self.program, &["start"], Some(path), self.start_timeout).await?;
        Ok(())
    }

    async fn remove_volumes(&self, project_id: &str) -> Result<usize, CommandError> {
        debug!(%project_id, "SupabaseCli::remove_volumes: called");
        let filter = format!("label=com.supabase.cli.project={}", project_id);
        let listing = run_checked(
            &self.container_program,
            &["volume", "ls", "--filter", &filter, "-q"],
            None,
            self.stop_timeout,
        )
        .await?;

        let volumes: Vec<&str> = listing.stdout.lines().map(str::trim).filter(|v| !v.is_empty()).collect();
        if volumes.is_empty() {
            debug!("SupabaseCli::remove_volumes: no volumes found");
            return Ok(0);
        }

        let mut args = vec!["volume", "rm"];
        args.extend(volumes.iter().copied());
        run_checked(&self.container_program, &args, None, self.stop_timeout).await?;
        Ok(volumes.len())
    }
}

/// npm-style package manager: `<program> <install args>` and `<program> run <script> --silent`
#[derive(Debug, Clone)]
pub struct PackageScripts {
    program: String,
    install_args: Vec<String>,
    install_timeout: Duration,
}

impl PackageScripts {
    pub fn new(commands: &CommandsConfig, timeouts: &TimeoutsConfig) -> Self {
        Self {
            program: commands.package_manager.clone(),
            install_args: commands.install_args.clone(),
            install_timeout: timeouts.install(),
        }
    }
}

#[async_trait]
impl PackageManager for PackageScripts {
    async fn install(&self, path: &Path) -> Result<(), CommandError> {
        debug!(?path, program = %self.program, "PackageScripts::install: called");
        let args: Vec<&str> = self.install_args.iter().map(String::as_str).collect();
        run_checked(&self.program, &args, Some(path), self.install_timeout).await?;
        Ok(())
    }

    async fn run_script(&self, path: &Path, script: &str, timeout: Duration) -> Result<(), CommandError> {
        debug!(?path, %script, "PackageScripts::run_script: called");
        run_checked(&self.program, &["run", script, "--silent"], Some(path), timeout).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct MergedPullRequest {
    number: u64,
}

/// Merged pull request lookup through the GitHub CLI
///
/// A missing `gh` binary, or no configured repository, means "nothing found".
#[derive(Debug, Clone)]
pub struct GhLookup {
    repo_slug: Option<String>,
    timeout: Duration,
}

impl GhLookup {
    pub fn new(repo_slug: Option<String>, timeout: Duration) -> Self {
        Self { repo_slug, timeout }
    }
}

#[async_trait]
impl ChangeLookup for GhLookup {
    async fn merged_change(&self, branch: &str) -> Result<Option<u64>, CommandError> {
        debug!(%branch, "GhLookup::merged_change: called");
        let Some(repo) = self.repo_slug.as_deref() else {
            debug!("GhLookup::merged_change: no repository configured");
            return Ok(None);
        };

        let args = [
            "pr", "list", "--repo", repo, "--head", branch, "--state", "merged", "--json", "number", "--limit", "1",
        ];
        let output = match run("gh", &args, None, self.timeout).await {
            Ok(output) => output,
            Err(e) if e.is_not_found() => {
                debug!("GhLookup::merged_change: gh not installed");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if !output.success() {
            warn!("gh pr list failed: {}", output.stderr.trim());
            return Ok(None);
        }

        parse_merged_change(&output.stdout)
    }
}

fn parse_merged_change(stdout: &str) -> Result<Option<u64>, CommandError> {
    let text = stdout.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let prs: Vec<MergedPullRequest> = serde_json::from_str(text).map_err(|e| CommandError::Parse {
        program: "gh pr".to_string(),
        detail: e.to_string(),
    })?;
    Ok(prs.first().map(|pr| pr.number))
}
