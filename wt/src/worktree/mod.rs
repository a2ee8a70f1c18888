//! Git worktree provisioning
//!
//! Each ephemeral branch gets its own worktree next to the main checkout, with
//! generated config and env files carrying its port assignment.

mod manager;
mod metadata;

pub use manager::{
    CreateOutcome, ListEntry, Regenerated, RemoveOutcome, WorktreeError, WorktreeKind, WorktreeManager,
    branch_to_dir_name, render_table,
};
pub use metadata::WorktreeMetadata;
