//! pinpoint-wt - per-branch worktree provisioning
//!
//! Every branch worktree gets a deterministic, collision-free block of ports,
//! generated config and env files derived from shared templates, and a safe
//! path to the current mainline that reports conflicts instead of resolving
//! them.
//!
//! # Modules
//!
//! - [`ports`] - Hash-seeded offset allocation
//! - [`template`] - Section-scoped config rendering and drift repair
//! - [`envfile`] - Env file regeneration that keeps operator keys
//! - [`vcs`] - Capability traits and their process-backed implementations
//! - [`sync`] - Multi-phase worktree synchronization
//! - [`report`] - Sync report and severity rollup
//! - [`worktree`] - Create, list, regenerate, and remove worktrees
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod envfile;
pub mod ports;
pub mod report;
pub mod sync;
pub mod template;
pub mod vcs;
pub mod worktree;

// Re-export commonly used types
pub use config::Config;
pub use ports::{PortAllocator, PortAssignment, PortError, UsedOffsetSet};
pub use report::{SeverityRollup, SyncReport, SyncReportBuilder};
pub use sync::{Severity, SyncOptions, SyncTarget, Toolbox, WorktreeState, WorktreeSyncOrchestrator};
pub use worktree::{WorktreeError, WorktreeManager};
