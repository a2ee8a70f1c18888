//! Merge-conflict classification and recovery recipes
//!
//! Recipes are shell-ready text for the operator. Nothing here runs them.

use std::path::Path;

/// Shape of a merge conflict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    /// Only the generated config artifact conflicts
    ConfigOnly,
    /// The config artifact plus other files
    Mixed { others: Vec<String> },
    /// Only files other than the config artifact
    Other { files: Vec<String> },
}

pub fn classify_conflicts(files: &[String], config_file: &str) -> ConflictKind {
    let config_conflict = files.iter().any(|f| f == config_file);
    let others: Vec<String> = files.iter().filter(|f| *f != config_file).cloned().collect();

    match (config_conflict, others.is_empty()) {
        (true, true) => ConflictKind::ConfigOnly,
        (true, false) => ConflictKind::Mixed { others },
        (false, _) => ConflictKind::Other { files: others },
    }
}

/// Inputs shared by every recipe
#[derive(Debug, Clone, Copy)]
pub struct RecipeContext<'a> {
    pub path: &'a Path,
    pub config_file: &'a str,
    pub main_branch: &'a str,
    pub pre_merge_sha: &'a str,
    pub resync_command: &'a str,
}

/// Merge message and recipe for a classified conflict
pub fn conflict_recipe(kind: &ConflictKind, files: &[String], ctx: &RecipeContext<'_>) -> (String, String) {
    match kind {
        ConflictKind::ConfigOnly => (
            "Merge conflicts in config.toml (auto-resolvable)".to_string(),
            config_only_recipe(ctx),
        ),
        ConflictKind::Mixed { others } => (
            format!("Merge conflicts in config.toml + {} other file(s)", others.len()),
            mixed_recipe(files, ctx),
        ),
        ConflictKind::Other { files } => (
            format!("Merge conflicts in {} file(s)", files.len()),
            manual_recipe(files, ctx),
        ),
    }
}

fn config_only_recipe(ctx: &RecipeContext<'_>) -> String {
    format!(
        "cd {path}

# Config artifact conflict detected - recommend accepting {main}'s version
# Local port values are restored by re-running reconciliation

# Auto-resolve (accept {main}'s config structure, restore ports after):
git checkout --theirs {config}
git add {config}
git commit -m \"Merge {main} (accept config.toml structure)\"
{resync}  # Restore correct ports
",
        path = ctx.path.display(),
        main = ctx.main_branch,
        config = ctx.config_file,
        resync = ctx.resync_command,
    )
}

fn mixed_recipe(files: &[String], ctx: &RecipeContext<'_>) -> String {
    format!(
        "cd {path}

# CONFLICTS IN MULTIPLE FILES - MANUAL RESOLUTION REQUIRED
# Files with conflicts: {files}

# Step 1: Resolve config.toml (accept {main}'s structure)
git checkout --theirs {config}
git add {config}

# Step 2: Resolve other conflicts manually
# Edit each file, then:
git add <resolved-files>

# Step 3: Complete merge
git commit

# Step 4: Restore correct ports
{resync}

# Alternative: Abort merge entirely
git merge --abort
git reset --hard {sha}
",
        path = ctx.path.display(),
        files = files.join(", "),
        main = ctx.main_branch,
        config = ctx.config_file,
        resync = ctx.resync_command,
        sha = ctx.pre_merge_sha,
    )
}

fn manual_recipe(files: &[String], ctx: &RecipeContext<'_>) -> String {
    format!(
        "cd {path}

# MANUAL CONFLICT RESOLUTION REQUIRED
# Files with conflicts: {files}

# Option 1: Resolve manually
git status
# Edit files to resolve conflicts, then:
git add <resolved-files>
git commit

# Option 2: Abort merge
git merge --abort
git reset --hard {sha}

# Option 3: Accept all of {main}'s changes
git checkout --theirs .
git add .
git commit -m \"Merge {main} (accept all {main} changes)\"
",
        path = ctx.path.display(),
        files = files.join(", "),
        sha = ctx.pre_merge_sha,
        main = ctx.main_branch,
    )
}

/// Recipe for a stash that would not re-apply cleanly
pub fn stash_pop_recipe(path: &Path) -> String {
    format!(
        "cd {}

# Stash pop conflicts detected

# Option 1: Resolve conflicts
git status
# Edit files, then:
git add <resolved-files>

# Option 2: Discard stash changes
git reset --hard HEAD",
        path.display()
    )
}
