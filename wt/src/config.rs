//! pinpoint-wt configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main pinpoint-wt configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port allocation settings
    pub ports: PortsConfig,

    /// File layout inside each worktree
    pub paths: PathsConfig,

    /// Git settings
    pub git: GitConfig,

    /// External commands used during provisioning and sync
    pub commands: CommandsConfig,

    /// Timeouts for external commands
    pub timeouts: TimeoutsConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .pinpoint-wt.yml
        let local_config = PathBuf::from(".pinpoint-wt.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/pinpoint-wt/pinpoint-wt.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("pinpoint-wt").join("pinpoint-wt.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = [
            config_path.cloned(),
            Some(PathBuf::from(".pinpoint-wt.yml")),
            dirs::config_dir().map(|d| d.join("pinpoint-wt").join("pinpoint-wt.yml")),
        ];
        candidates
            .iter()
            .flatten()
            .find(|p| p.exists())
            .and_then(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// A long-lived worktree with hand-picked offsets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticWorktree {
    /// Worktree directory name
    pub name: String,

    #[serde(rename = "nextjs-offset")]
    pub nextjs_offset: u16,

    #[serde(rename = "supabase-offset")]
    pub supabase_offset: u16,

    #[serde(rename = "project-id")]
    pub project_id: String,
}

impl StaticWorktree {
    fn new(name: &str, nextjs_offset: u16, supabase_offset: u16, project_id: &str) -> Self {
        Self {
            name: name.to_string(),
            nextjs_offset,
            supabase_offset,
            project_id: project_id.to_string(),
        }
    }
}

/// Port allocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    /// First offset of the ephemeral range
    #[serde(rename = "ephemeral-min")]
    pub ephemeral_min: u16,

    /// Last offset of the ephemeral range (inclusive)
    #[serde(rename = "ephemeral-max")]
    pub ephemeral_max: u16,

    /// Width of one ephemeral slot
    #[serde(rename = "ephemeral-step")]
    pub ephemeral_step: u16,

    /// Prefix for derived project ids
    #[serde(rename = "project-prefix")]
    pub project_prefix: String,

    /// Static worktrees and their reserved offsets
    #[serde(rename = "static-worktrees")]
    pub static_worktrees: Vec<StaticWorktree>,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            ephemeral_min: 4000,
            ephemeral_max: 9900,
            ephemeral_step: 100,
            project_prefix: "pinpoint".to_string(),
            static_worktrees: vec![
                StaticWorktree::new("PinPoint", 0, 0, "pinpoint"),
                StaticWorktree::new("PinPoint-Secondary", 100, 1000, "pinpoint-secondary"),
                StaticWorktree::new("PinPoint-review", 200, 2000, "pinpoint-review"),
                StaticWorktree::new("PinPoint-AntiGravity", 300, 3000, "pinpoint-antigravity"),
            ],
        }
    }
}

impl PortsConfig {
    /// Find the static entry for a worktree name
    pub fn static_worktree(&self, name: &str) -> Option<&StaticWorktree> {
        self.static_worktrees.iter().find(|s| s.name == name)
    }
}

/// File layout, relative to each worktree root unless noted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for ephemeral worktrees, relative to the repository root
    #[serde(rename = "worktree-dir")]
    pub worktree_dir: PathBuf,

    /// Shared config template
    pub template: PathBuf,

    /// Generated config artifact
    #[serde(rename = "config-file")]
    pub config_file: PathBuf,

    /// Generated environment file
    #[serde(rename = "env-file")]
    pub env_file: PathBuf,

    /// Record of the assigned offsets
    #[serde(rename = "metadata-file")]
    pub metadata_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            worktree_dir: PathBuf::from("../pinpoint-worktrees"),
            template: PathBuf::from("supabase/config.toml.template"),
            config_file: PathBuf::from("supabase/config.toml"),
            env_file: PathBuf::from(".env.local"),
            metadata_file: PathBuf::from(".pinpoint-ports.yml"),
        }
    }
}

impl PathsConfig {
    /// Config artifact path as git sees it (forward slashes)
    pub fn config_file_git_path(&self) -> String {
        self.config_file.to_string_lossy().replace('\\', "/")
    }
}

/// Git settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Mainline branch name
    #[serde(rename = "main-branch")]
    pub main_branch: String,

    /// Remote name
    pub remote: String,

    /// `owner/name` used to look up merged pull requests; lookup is skipped when unset
    #[serde(rename = "repo-slug")]
    pub repo_slug: Option<String>,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            main_branch: "main".to_string(),
            remote: "origin".to_string(),
            repo_slug: Some("timothyfroehlich/PinPoint".to_string()),
        }
    }
}

impl GitConfig {
    /// `<remote>/<main>`
    pub fn upstream_main(&self) -> String {
        format!("{}/{}", self.remote, self.main_branch)
    }
}

/// External commands used during provisioning and sync
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Package manager program
    #[serde(rename = "package-manager")]
    pub package_manager: String,

    /// Arguments for a dependency install
    #[serde(rename = "install-args")]
    pub install_args: Vec<String>,

    /// Background service CLI (start/stop)
    #[serde(rename = "service-cli")]
    pub service_cli: String,

    /// Container runtime CLI used for volume cleanup
    #[serde(rename = "container-cli")]
    pub container_cli: String,

    /// Script that resets and reseeds the database
    #[serde(rename = "db-reset-script")]
    pub db_reset_script: String,

    /// Script that regenerates derived schema artifacts
    #[serde(rename = "schema-script")]
    pub schema_script: String,

    /// Consolidated validation script
    #[serde(rename = "check-script")]
    pub check_script: String,

    /// Command printed in recovery recipes to re-run reconciliation
    #[serde(rename = "resync-command")]
    pub resync_command: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            package_manager: "npm".to_string(),
            install_args: vec!["ci".to_string(), "--silent".to_string()],
            service_cli: "supabase".to_string(),
            container_cli: "docker".to_string(),
            db_reset_script: "db:reset".to_string(),
            schema_script: "test:generate-schema".to_string(),
            check_script: "check".to_string(),
            resync_command: "pinpoint-wt update".to_string(),
        }
    }
}

/// Timeouts in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub git: u64,

    pub install: u64,

    #[serde(rename = "service-start")]
    pub service_start: u64,

    #[serde(rename = "service-stop")]
    pub service_stop: u64,

    pub script: u64,

    pub validation: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            git: 120,
            install: 300,
            service_start: 120,
            service_stop: 60,
            script: 60,
            validation: 120,
        }
    }
}

impl TimeoutsConfig {
    pub fn git(&self) -> Duration {
        Duration::from_secs(self.git)
    }

    pub fn install(&self) -> Duration {
        Duration::from_secs(self.install)
    }

    pub fn service_start(&self) -> Duration {
        Duration::from_secs(self.service_start)
    }

    pub fn service_stop(&self) -> Duration {
        Duration::from_secs(self.service_stop)
    }

    pub fn script(&self) -> Duration {
        Duration::from_secs(self.script)
    }

    pub fn validation(&self) -> Duration {
        Duration::from_secs(self.validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.ports.ephemeral_min, 4000);
        assert_eq!(config.ports.ephemeral_max, 9900);
        assert_eq!(config.ports.static_worktrees.len(), 4);
        assert_eq!(config.git.main_branch, "main");
        assert_eq!(config.paths.config_file, PathBuf::from("supabase/config.toml"));
    }

    #[test]
    fn test_static_worktree_lookup() {
        let config = PortsConfig::default();

        let review = config.static_worktree("PinPoint-review").unwrap();
        assert_eq!(review.supabase_offset, 2000);
        assert_eq!(review.project_id, "pinpoint-review");
        assert!(config.static_worktree("feat-x").is_none());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
ports:
  ephemeral-min: 5000
  ephemeral-max: 5900
  ephemeral-step: 100
  project-prefix: demo
  static-worktrees:
    - name: Demo
      nextjs-offset: 0
      supabase-offset: 0
      project-id: demo

git:
  main-branch: trunk
  remote: upstream

commands:
  package-manager: pnpm
  install-args: [install, --frozen-lockfile]

timeouts:
  install: 30
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.ports.ephemeral_min, 5000);
        assert_eq!(config.ports.project_prefix, "demo");
        assert_eq!(config.ports.static_worktrees.len(), 1);
        assert_eq!(config.git.upstream_main(), "upstream/trunk");
        assert_eq!(config.commands.package_manager, "pnpm");
        assert_eq!(config.timeouts.install(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
git:
  main-branch: develop
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.git.main_branch, "develop");

        // Defaults for unspecified
        assert_eq!(config.git.remote, "origin");
        assert_eq!(config.ports.ephemeral_step, 100);
        assert_eq!(config.timeouts.git, 120);
        assert!(config.log_level.is_none());
    }
}
