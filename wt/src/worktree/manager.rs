//! Worktree manager for provisioning, listing, regenerating, and removing worktrees

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};

use super::metadata::WorktreeMetadata;
use crate::config::Config;
use crate::envfile;
use crate::ports::{PortAllocator, PortAssignment, PortError, UsedOffsetSet, branch_to_project_id};
use crate::sync::{SyncTarget, Toolbox};
use crate::template::{self, TemplateError};
use crate::vcs::{BranchSource, CommandError};

/// Error types for worktree operations
#[derive(Debug, thiserror::Error)]
pub enum WorktreeError {
    #[error("Worktree already exists at {}", .0.display())]
    Exists(PathBuf),

    #[error("Worktree not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to fetch from {remote}. Check your network connection.")]
    FetchFailed {
        remote: String,
        #[source]
        source: CommandError,
    },

    #[error("Failed to create worktree: {0}")]
    CreateFailed(#[source] CommandError),

    #[error("Could not determine branch for {}", .0.display())]
    BranchUnknown(PathBuf),

    #[error(transparent)]
    Ports(#[from] PortError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Git command failed: {0}")]
    Git(#[from] CommandError),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a successful `create`
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub path: PathBuf,
    pub branch: String,
    pub source: BranchSource,
    pub assignment: PortAssignment,
    /// Set when the dependency install failed; creation still succeeded
    pub install_warning: Option<String>,
}

/// Result of a successful `remove`
#[derive(Debug, Clone)]
pub struct RemoveOutcome {
    pub path: PathBuf,
    pub project_id: String,
    pub volumes_removed: usize,
    pub warnings: Vec<String>,
}

/// Result of regenerating one worktree's generated files
#[derive(Debug, Clone)]
pub enum Regenerated {
    Written { assignment: PortAssignment },
    NoTemplate,
}

/// How a listed worktree gets its ports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorktreeKind {
    Static,
    Ephemeral,
    Other,
}

impl WorktreeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Ephemeral => "ephemeral",
            Self::Other => "other",
        }
    }
}

/// One row of `list`
#[derive(Debug, Clone)]
pub struct ListEntry {
    pub path: PathBuf,
    pub name: String,
    pub branch: String,
    pub offset: Option<u16>,
    pub kind: WorktreeKind,
}

/// Replace `/` so a branch maps to a single directory level
pub fn branch_to_dir_name(branch: &str) -> String {
    branch.replace('/', "-")
}

/// Render `list` output as a fixed-width table
pub fn render_table(entries: &[ListEntry]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<40} {:<30} {:>8} {:<10}\n", "WORKTREE", "BRANCH", "OFFSET", "TYPE"));
    out.push_str(&"-".repeat(92));
    out.push('\n');
    for entry in entries {
        let offset = entry.offset.map(|o| o.to_string()).unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<40} {:<30} {:>8} {:<10}\n",
            entry.name,
            entry.branch,
            offset,
            entry.kind.as_str()
        ));
    }
    out
}

/// Manager for provisioned worktrees
pub struct WorktreeManager {
    config: Config,
    repo_root: PathBuf,
    tools: Toolbox,
    allocator: PortAllocator,
}

impl WorktreeManager {
    pub fn new(config: Config, repo_root: impl Into<PathBuf>, tools: Toolbox) -> Result<Self, WorktreeError> {
        let repo_root = repo_root.into();
        debug!(?repo_root, "WorktreeManager::new: called");
        let allocator = PortAllocator::new(&config.ports)?;
        Ok(Self {
            config,
            repo_root,
            tools,
            allocator,
        })
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Directory that holds ephemeral worktrees
    pub fn worktree_base(&self) -> PathBuf {
        normalize(&self.repo_root.join(&self.config.paths.worktree_dir))
    }

    /// Flat directory for a branch
    pub fn worktree_path(&self, branch: &str) -> PathBuf {
        self.worktree_base().join(branch_to_dir_name(branch))
    }

    /// Create an ephemeral worktree for `branch` with its own ports
    pub async fn create(&self, branch: &str, base: Option<&str>) -> Result<CreateOutcome, WorktreeError> {
        debug!(%branch, ?base, "WorktreeManager::create: called");
        let path = self.worktree_path(branch);
        if path.exists() {
            debug!("WorktreeManager::create: target directory exists");
            return Err(WorktreeError::Exists(path));
        }

        let git = &self.config.git;
        let registry = &self.tools.registry;
        let local = registry.local_branch_exists(&self.repo_root, branch).await?;
        let remote = !local && registry.remote_branch_exists(&self.repo_root, &git.remote, branch).await?;

        self.tools
            .vcs
            .fetch(&self.repo_root, &git.remote)
            .await
            .map_err(|source| WorktreeError::FetchFailed {
                remote: git.remote.clone(),
                source,
            })?;

        let used = self.scan_used_offsets().await;
        let offset = self.allocator.allocate_ephemeral(branch, &used)?;
        let assignment = PortAssignment::ephemeral(branch, offset, self.allocator.project_prefix());
        info!(%branch, offset, api = assignment.api_port(), "Allocated ports");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| WorktreeError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let source = if local {
            BranchSource::Local
        } else if remote {
            BranchSource::Remote
        } else {
            BranchSource::New {
                base: base.map(String::from).unwrap_or_else(|| git.upstream_main()),
            }
        };
        registry
            .add_worktree(&self.repo_root, &path, branch, &source)
            .await
            .map_err(WorktreeError::CreateFailed)?;
        info!(?path, %branch, ?source, "Created worktree");

        self.write_config(&path, &assignment)?;
        self.write_env(&path, &assignment)?;
        self.write_metadata(&path, &assignment)?;

        let install_warning = match self.tools.packages.install(&path).await {
            Ok(()) => None,
            Err(e) => {
                warn!("Dependency install failed in {}: {}", path.display(), e);
                Some(e.to_string())
            }
        };

        Ok(CreateOutcome {
            path,
            branch: branch.to_string(),
            source,
            assignment,
            install_warning,
        })
    }

    /// Every registered worktree with its branch, offset, and kind
    pub async fn list(&self) -> Result<Vec<ListEntry>, WorktreeError> {
        debug!("WorktreeManager::list: called");
        let mut entries = self.tools.registry.list_worktrees(&self.repo_root).await?;
        entries.retain(|e| !e.bare);
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let base = self.worktree_base();
        let base_name = base.file_name().map(|n| n.to_os_string());

        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let name = dir_name(&entry.path);
            let branch = match (&entry.branch, entry.detached) {
                (Some(branch), _) => branch.clone(),
                (None, true) => "HEAD".to_string(),
                (None, false) => "unknown".to_string(),
            };
            let (kind, offset) = if let Some(fixed) = self.config.ports.static_worktree(&name) {
                (WorktreeKind::Static, Some(fixed.supabase_offset))
            } else if base_name
                .as_ref()
                .is_some_and(|b| entry.path.components().any(|c| c.as_os_str() == b.as_os_str()))
            {
                (WorktreeKind::Ephemeral, self.recorded_offset(&entry.path))
            } else {
                (WorktreeKind::Other, self.recorded_offset(&entry.path))
            };
            rows.push(ListEntry {
                path: entry.path,
                name,
                branch,
                offset,
                kind,
            });
        }
        Ok(rows)
    }

    /// Paths of every registered, present, non-bare worktree
    pub async fn worktree_paths(&self) -> Result<Vec<PathBuf>, WorktreeError> {
        debug!("WorktreeManager::worktree_paths: called");
        let entries = self.tools.registry.list_worktrees(&self.repo_root).await?;
        Ok(entries
            .into_iter()
            .filter(|e| !e.bare && e.path.exists())
            .map(|e| e.path)
            .collect())
    }

    /// Tear down the worktree for `branch`; the branch itself is kept
    pub async fn remove(&self, branch: &str) -> Result<RemoveOutcome, WorktreeError> {
        debug!(%branch, "WorktreeManager::remove: called");
        let flat = self.worktree_path(branch);
        let path = if flat.exists() {
            flat
        } else {
            debug!("WorktreeManager::remove: flat path missing, trying nested path");
            self.worktree_base().join(branch)
        };
        if !path.exists() {
            return Err(WorktreeError::NotFound(path));
        }

        let project_id = match self.load_metadata(&path) {
            Some(metadata) => metadata.assignment.project_id,
            None => branch_to_project_id(branch, self.allocator.project_prefix()),
        };
        let mut warnings = Vec::new();

        if let Err(e) = self.tools.services.stop(&path).await {
            debug!(%e, "WorktreeManager::remove: service stop failed, ignoring");
        }

        let volumes_removed = match self.tools.services.remove_volumes(&project_id).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to remove volumes for {}: {}", project_id, e);
                warnings.push(format!("Volume cleanup failed: {}", e));
                0
            }
        };

        if let Err(e) = self.tools.registry.remove_worktree(&self.repo_root, &path).await {
            warn!("git worktree remove failed for {}: {}", path.display(), e);
            warnings.push(e.to_string());
        }
        if let Err(e) = self.tools.registry.prune(&self.repo_root).await {
            debug!(%e, "WorktreeManager::remove: prune failed");
        }

        info!(?path, %project_id, volumes_removed, "Removed worktree");
        Ok(RemoveOutcome {
            path,
            project_id,
            volumes_removed,
            warnings,
        })
    }

    /// Rewrite the config artifact and env file of one worktree
    ///
    /// Worktrees without a template are left alone.
    pub async fn regenerate(&self, path: &Path) -> Result<Regenerated, WorktreeError> {
        debug!(?path, "WorktreeManager::regenerate: called");
        let assignment = self.resolve_assignment(path).await?;
        if !path.join(&self.config.paths.template).exists() {
            debug!("WorktreeManager::regenerate: no template");
            return Ok(Regenerated::NoTemplate);
        }

        self.write_config(path, &assignment)?;
        self.write_env(path, &assignment)?;
        if !path.join(&self.config.paths.metadata_file).exists() {
            self.write_metadata(path, &assignment)?;
        }
        Ok(Regenerated::Written { assignment })
    }

    /// Ports an existing worktree should use
    ///
    /// Static table by directory name, then the metadata record, then the
    /// env file, then a fresh allocation for the checked-out branch.
    pub async fn resolve_assignment(&self, path: &Path) -> Result<PortAssignment, WorktreeError> {
        self.resolve_against(path, &UsedOffsetSet::new()).await
    }

    /// `resolve_assignment`, also avoiding offsets already handed out in this batch
    async fn resolve_against(&self, path: &Path, claimed: &UsedOffsetSet) -> Result<PortAssignment, WorktreeError> {
        debug!(?path, claimed = claimed.len(), "WorktreeManager::resolve_against: called");
        let name = dir_name(path);
        if let Some(entry) = self.config.ports.static_worktree(&name) {
            return Ok(PortAssignment::from_static(entry));
        }
        if let Some(metadata) = self.load_metadata(path) {
            return Ok(metadata.assignment);
        }

        let branch = self.tools.vcs.current_branch(path).await.ok();
        let prefix = self.allocator.project_prefix();
        if let Some(offset) = self.env_offset(path) {
            let branch = branch.unwrap_or(name);
            return Ok(PortAssignment::ephemeral(&branch, offset, prefix));
        }

        let Some(branch) = branch else {
            return Err(WorktreeError::BranchUnknown(path.to_path_buf()));
        };
        let mut used = self.scan_used_offsets().await;
        for offset in claimed.iter() {
            used.insert(offset);
        }
        let offset = self.allocator.allocate_ephemeral(&branch, &used)?;
        Ok(PortAssignment::ephemeral(&branch, offset, prefix))
    }

    /// Sync targets for the given worktree paths
    ///
    /// `main` is the worktree on the mainline branch, as found by pre-flight.
    /// Offsets resolved earlier in the batch count as used for later paths,
    /// since none of them are on disk until the sync writes them.
    pub async fn sync_targets(&self, paths: &[PathBuf], main: Option<&Path>) -> Vec<(PathBuf, Result<SyncTarget, WorktreeError>)> {
        debug!(count = paths.len(), ?main, "WorktreeManager::sync_targets: called");
        let main = main.map(canonical);
        let mut claimed = UsedOffsetSet::new();
        let mut targets = Vec::with_capacity(paths.len());
        for path in paths {
            let resolved = self.resolve_against(path, &claimed).await;
            if let Ok(assignment) = &resolved {
                claimed.insert(assignment.supabase_offset);
            }
            let target = resolved.map(|assignment| SyncTarget {
                path: path.clone(),
                assignment,
                is_main: main.as_ref().is_some_and(|m| *m == canonical(path)),
            });
            targets.push((path.clone(), target));
        }
        targets
    }

    /// Every offset in use: the static table plus what each worktree records
    pub async fn scan_used_offsets(&self) -> UsedOffsetSet {
        debug!("WorktreeManager::scan_used_offsets: called");
        let mut used = self.allocator.static_offsets();
        match self.tools.registry.list_worktrees(&self.repo_root).await {
            Ok(entries) => {
                for entry in entries {
                    if let Some(offset) = self.recorded_offset(&entry.path) {
                        used.insert(offset);
                    }
                }
            }
            Err(e) => warn!("Failed to list worktrees, using static offsets only: {}", e),
        }
        debug!(used = used.len(), "WorktreeManager::scan_used_offsets: done");
        used
    }

    /// Offset recorded in a worktree: metadata record first, then the env file
    fn recorded_offset(&self, path: &Path) -> Option<u16> {
        self.load_metadata(path)
            .map(|m| m.assignment.supabase_offset)
            .or_else(|| self.env_offset(path))
    }

    fn env_offset(&self, path: &Path) -> Option<u16> {
        let content = fs::read_to_string(path.join(&self.config.paths.env_file)).ok()?;
        envfile::offset_from_env(&content)
    }

    fn load_metadata(&self, path: &Path) -> Option<WorktreeMetadata> {
        match WorktreeMetadata::load(&path.join(&self.config.paths.metadata_file)) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Ignoring unreadable metadata in {}: {:#}", path.display(), e);
                None
            }
        }
    }

    fn write_config(&self, path: &Path, assignment: &PortAssignment) -> Result<(), WorktreeError> {
        let paths = &self.config.paths;
        let template = template::load_template(&path.join(&paths.template))?;
        let config_path = path.join(&paths.config_file);
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|source| WorktreeError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        template::write_protected(&config_path, &template::render(&template, assignment))?;
        Ok(())
    }

    fn write_env(&self, path: &Path, assignment: &PortAssignment) -> Result<(), WorktreeError> {
        let env_path = path.join(&self.config.paths.env_file);
        let existing = fs::read_to_string(&env_path).ok();
        template::write_protected(&env_path, &envfile::merge(existing.as_deref(), assignment))?;
        Ok(())
    }

    fn write_metadata(&self, path: &Path, assignment: &PortAssignment) -> Result<(), WorktreeError> {
        WorktreeMetadata::new(assignment.clone())
            .save(&path.join(&self.config.paths.metadata_file))
            .map_err(|e| WorktreeError::Metadata(format!("{:#}", e)))
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Resolve `.` and `..` lexically
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::{ChangeLookup, Git, PackageManager, ServiceRuntime};
    use async_trait::async_trait;
    use std::process::Command as StdCommand;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    const TEMPLATE: &str = "project_id = \"pinpoint\"\n\n[api]\nport = 54321\n\n[auth]\nsite_url = \"http://localhost:3000\"\n";

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl ServiceRuntime for Recorder {
        async fn stop(&self, _path: &Path) -> Result<(), CommandError> {
            self.record("stop".to_string());
            Ok(())
        }

        async fn start(&self, _path: &Path) -> Result<(), CommandError> {
            self.record("start".to_string());
            Ok(())
        }

        async fn remove_volumes(&self, project_id: &str) -> Result<usize, CommandError> {
            self.record(format!("remove_volumes:{}", project_id));
            Ok(2)
        }
    }

    #[async_trait]
    impl PackageManager for Recorder {
        async fn install(&self, _path: &Path) -> Result<(), CommandError> {
            self.record("install".to_string());
            Ok(())
        }

        async fn run_script(&self, _path: &Path, script: &str, _timeout: Duration) -> Result<(), CommandError> {
            self.record(format!("run_script:{}", script));
            Ok(())
        }
    }

    #[async_trait]
    impl ChangeLookup for Recorder {
        async fn merged_change(&self, _branch: &str) -> Result<Option<u64>, CommandError> {
            Ok(None)
        }
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = StdCommand::new("git").args(args).current_dir(dir).output().unwrap();
        assert!(status.status.success(), "git {:?}: {}", args, String::from_utf8_lossy(&status.stderr));
    }

    /// Repo with a template on `main`, pushed to a bare `origin`
    fn setup_repo() -> (TempDir, PathBuf) {
        let temp = tempdir().unwrap();
        let origin = temp.path().join("origin.git");
        let repo = temp.path().join("repo");
        fs::create_dir_all(&origin).unwrap();
        fs::create_dir_all(repo.join("supabase")).unwrap();
        git(&origin, &["init", "--bare", "-b", "main"]);

        git(&repo, &["init", "-b", "main"]);
        git(&repo, &["config", "user.email", "test@test.com"]);
        git(&repo, &["config", "user.name", "Test"]);
        fs::write(repo.join("supabase/config.toml.template"), TEMPLATE).unwrap();
        git(&repo, &["add", "."]);
        git(&repo, &["commit", "-m", "initial"]);
        git(&repo, &["remote", "add", "origin", &origin.to_string_lossy()]);
        git(&repo, &["push", "-u", "origin", "main"]);
        (temp, repo)
    }

    fn manager(repo: &Path, worktrees: &Path, recorder: &Arc<Recorder>) -> WorktreeManager {
        let git = Arc::new(Git::new(Duration::from_secs(30)));
        let tools = Toolbox {
            vcs: git.clone(),
            registry: git,
            services: recorder.clone(),
            packages: recorder.clone(),
            changes: recorder.clone(),
        };
        let mut config = Config::default();
        config.paths.worktree_dir = worktrees.to_path_buf();
        WorktreeManager::new(config, repo, tools).unwrap()
    }

    #[test]
    fn test_branch_to_dir_name() {
        assert_eq!(branch_to_dir_name("feat/x"), "feat-x");
        assert_eq!(branch_to_dir_name("fix/a/b"), "fix-a-b");
        assert_eq!(branch_to_dir_name("plain"), "plain");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize(Path::new("/work/PinPoint/../pinpoint-worktrees")),
            PathBuf::from("/work/pinpoint-worktrees")
        );
        assert_eq!(normalize(Path::new("/a/./b")), PathBuf::from("/a/b"));
    }

    #[test]
    fn test_worktree_path_default_layout() {
        let recorder = Arc::new(Recorder::default());
        let git = Arc::new(Git::new(Duration::from_secs(5)));
        let tools = Toolbox {
            vcs: git.clone(),
            registry: git,
            services: recorder.clone(),
            packages: recorder.clone(),
            changes: recorder,
        };
        let manager = WorktreeManager::new(Config::default(), "/work/PinPoint", tools).unwrap();

        assert_eq!(
            manager.worktree_path("feat/x"),
            PathBuf::from("/work/pinpoint-worktrees/feat-x")
        );
    }

    #[test]
    fn test_render_table() {
        let rows = vec![
            ListEntry {
                path: PathBuf::from("/work/PinPoint"),
                name: "PinPoint".to_string(),
                branch: "main".to_string(),
                offset: Some(0),
                kind: WorktreeKind::Static,
            },
            ListEntry {
                path: PathBuf::from("/work/scratch"),
                name: "scratch".to_string(),
                branch: "HEAD".to_string(),
                offset: None,
                kind: WorktreeKind::Other,
            },
        ];
        let table = render_table(&rows);
        let lines: Vec<&str> = table.lines().collect();

        assert!(lines[0].starts_with("WORKTREE"));
        assert_eq!(lines[1], "-".repeat(92));
        assert!(lines[2].starts_with("PinPoint "));
        assert!(lines[2].contains("       0 static"));
        assert!(lines[3].contains("       - other"));
    }

    #[tokio::test]
    async fn test_create_list_remove() {
        let (temp, repo) = setup_repo();
        let worktrees = temp.path().join("pinpoint-worktrees");
        let recorder = Arc::new(Recorder::default());
        let manager = manager(&repo, &worktrees, &recorder);

        let created = manager.create("feat/x", None).await.unwrap();
        assert_eq!(created.path, worktrees.join("feat-x"));
        assert_eq!(created.assignment.supabase_offset, 6900);
        assert_eq!(
            created.source,
            BranchSource::New {
                base: "origin/main".to_string()
            }
        );
        assert!(created.install_warning.is_none());

        let config = fs::read_to_string(created.path.join("supabase/config.toml")).unwrap();
        assert!(config.starts_with(template::CONFIG_BANNER));
        assert!(config.contains("port = 61221"));
        assert!(config.contains("project_id = \"pinpoint-feat-x\""));
        let env = fs::read_to_string(created.path.join(".env.local")).unwrap();
        assert!(env.contains("NEXT_PUBLIC_SUPABASE_URL=http://localhost:61221"));
        assert!(created.path.join(".pinpoint-ports.yml").exists());
        assert!(recorder.calls().contains(&"install".to_string()));

        let rows = manager.list().await.unwrap();
        let row = rows.iter().find(|r| r.name == "feat-x").unwrap();
        assert_eq!(row.kind, WorktreeKind::Ephemeral);
        assert_eq!(row.offset, Some(6900));
        assert_eq!(row.branch, "feat/x");
        let main = rows.iter().find(|r| r.name == "repo").unwrap();
        assert_eq!(main.kind, WorktreeKind::Other);
        assert_eq!(main.offset, None);

        // A second branch never reuses the first one's offset
        let used = manager.scan_used_offsets().await;
        assert!(used.contains(6900));

        let removed = manager.remove("feat/x").await.unwrap();
        assert!(!removed.path.exists());
        assert_eq!(removed.project_id, "pinpoint-feat-x");
        assert_eq!(removed.volumes_removed, 2);
        assert!(recorder.calls().contains(&"remove_volumes:pinpoint-feat-x".to_string()));
    }

    #[tokio::test]
    async fn test_create_rejects_existing_directory() {
        let (temp, repo) = setup_repo();
        let worktrees = temp.path().join("pinpoint-worktrees");
        fs::create_dir_all(worktrees.join("feat-x")).unwrap();
        let recorder = Arc::new(Recorder::default());
        let manager = manager(&repo, &worktrees, &recorder);

        let result = manager.create("feat/x", None).await;
        assert!(matches!(result, Err(WorktreeError::Exists(_))));
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_existing_local_branch() {
        let (temp, repo) = setup_repo();
        git(&repo, &["branch", "feat/local"]);
        let worktrees = temp.path().join("pinpoint-worktrees");
        let recorder = Arc::new(Recorder::default());
        let manager = manager(&repo, &worktrees, &recorder);

        let created = manager.create("feat/local", None).await.unwrap();
        assert_eq!(created.source, BranchSource::Local);
    }

    #[tokio::test]
    async fn test_create_fetch_failure() {
        let (temp, repo) = setup_repo();
        git(&repo, &["remote", "set-url", "origin", "/nonexistent/origin.git"]);
        let worktrees = temp.path().join("pinpoint-worktrees");
        let recorder = Arc::new(Recorder::default());
        let manager = manager(&repo, &worktrees, &recorder);

        let result = manager.create("feat/x", None).await;
        assert!(matches!(result, Err(WorktreeError::FetchFailed { .. })));
        assert!(!worktrees.join("feat-x").exists());
    }

    #[tokio::test]
    async fn test_remove_missing_worktree() {
        let (temp, repo) = setup_repo();
        let recorder = Arc::new(Recorder::default());
        let manager = manager(&repo, &temp.path().join("pinpoint-worktrees"), &recorder);

        let result = manager.remove("feat/none").await;
        assert!(matches!(result, Err(WorktreeError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_resolve_assignment_order() {
        let temp = tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let manager = manager(temp.path(), &temp.path().join("wts"), &recorder);

        // Static table by directory name
        let review = temp.path().join("PinPoint-review");
        fs::create_dir_all(&review).unwrap();
        let assignment = manager.resolve_assignment(&review).await.unwrap();
        assert!(assignment.is_static);
        assert_eq!(assignment.supabase_offset, 2000);

        // Env file when there is no metadata record
        let scratch = temp.path().join("scratch");
        fs::create_dir_all(&scratch).unwrap();
        fs::write(scratch.join(".env.local"), "NEXT_PUBLIC_SUPABASE_URL=http://localhost:58321\n").unwrap();
        let assignment = manager.resolve_assignment(&scratch).await.unwrap();
        assert_eq!(assignment.supabase_offset, 4000);
        assert_eq!(assignment.name, "scratch");

        // Metadata record wins over the env file
        WorktreeMetadata::new(PortAssignment::ephemeral("feat/y", 6100, "pinpoint"))
            .save(&scratch.join(".pinpoint-ports.yml"))
            .unwrap();
        let assignment = manager.resolve_assignment(&scratch).await.unwrap();
        assert_eq!(assignment.supabase_offset, 6100);
        assert_eq!(assignment.name, "feat/y");

        // Nothing recorded and no branch to allocate for
        let bare = temp.path().join("bare");
        fs::create_dir_all(&bare).unwrap();
        let result = manager.resolve_assignment(&bare).await;
        assert!(matches!(result, Err(WorktreeError::BranchUnknown(_))));
    }

    #[tokio::test]
    async fn test_sync_targets_hand_out_distinct_offsets() {
        let (temp, repo) = setup_repo();
        let worktrees = temp.path().join("pinpoint-worktrees");
        let recorder = Arc::new(Recorder::default());
        let manager = manager(&repo, &worktrees, &recorder);

        // Neither worktree records an offset yet, and both branches hash to slot 6900
        let first = worktrees.join("feat-x");
        let second = worktrees.join("main-ish");
        git(&repo, &["worktree", "add", "-b", "feat/x", &first.to_string_lossy()]);
        git(&repo, &["worktree", "add", "-b", "main-ish", &second.to_string_lossy()]);

        let targets = manager.sync_targets(&[first.clone(), second.clone()], Some(&repo)).await;
        let offsets: Vec<u16> = targets
            .iter()
            .map(|(_, target)| target.as_ref().unwrap().assignment.supabase_offset)
            .collect();

        assert_eq!(offsets[0], 6900);
        assert_ne!(offsets[0], offsets[1], "two worktrees were handed the same offset");
        assert!(targets.iter().all(|(_, target)| !target.as_ref().unwrap().is_main));

        // Resolving one at a time still sees only what is on disk
        assert_eq!(manager.resolve_assignment(&second).await.unwrap().supabase_offset, offsets[0]);
    }

    #[tokio::test]
    async fn test_regenerate_preserves_custom_keys() {
        let temp = tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let manager = manager(temp.path(), &temp.path().join("wts"), &recorder);

        let wt = temp.path().join("scratch");
        fs::create_dir_all(wt.join("supabase")).unwrap();
        fs::write(wt.join("supabase/config.toml.template"), TEMPLATE).unwrap();
        fs::write(
            wt.join(".env.local"),
            "NEXT_PUBLIC_SUPABASE_URL=http://localhost:58321\nMY_VAR=hello\n",
        )
        .unwrap();

        let result = manager.regenerate(&wt).await.unwrap();
        assert!(matches!(result, Regenerated::Written { ref assignment } if assignment.supabase_offset == 4000));

        let env = fs::read_to_string(wt.join(".env.local")).unwrap();
        assert!(env.contains("MY_VAR=hello"));
        let config = fs::read_to_string(wt.join("supabase/config.toml")).unwrap();
        assert!(config.contains("port = 58321"));
        assert!(wt.join(".pinpoint-ports.yml").exists());

        // Read-only files are rewritten on the next pass
        assert!(matches!(manager.regenerate(&wt).await.unwrap(), Regenerated::Written { .. }));
    }

    #[tokio::test]
    async fn test_regenerate_skips_without_template() {
        let temp = tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let manager = manager(temp.path(), &temp.path().join("wts"), &recorder);

        let wt = temp.path().join("PinPoint");
        fs::create_dir_all(&wt).unwrap();

        assert!(matches!(manager.regenerate(&wt).await.unwrap(), Regenerated::NoTemplate));
        assert!(!wt.join(".env.local").exists());
    }
}
