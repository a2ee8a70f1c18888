//! Worktree synchronization with the mainline
//!
//! The orchestrator advances each worktree through a fixed sequence of phases
//! and records what happened in a [`WorktreeState`]. Merge conflicts are never
//! resolved automatically; they are classified and turned into recovery
//! recipes for the operator.

mod orchestrator;
mod recovery;
mod state;


pub use orchestrator::{SyncError, SyncOptions, SyncTarget, Toolbox, WorktreeSyncOrchestrator};
pub use recovery::{ConflictKind, RecipeContext, classify_conflicts, conflict_recipe, stash_pop_recipe};
pub use state::{MergeStatus, Severity, WorktreeState};
