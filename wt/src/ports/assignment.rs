//! Port assignments and the ports derived from them

use serde::{Deserialize, Serialize};

use crate::config::StaticWorktree;

// Base ports (Supabase and Next.js defaults)
pub const BASE_PORT_NEXTJS: u16 = 3000;
pub const BASE_PORT_API: u16 = 54321;
pub const BASE_PORT_DB: u16 = 54322;
pub const BASE_PORT_SHADOW: u16 = 54320;
pub const BASE_PORT_POOLER: u16 = 54329;
pub const BASE_PORT_INBUCKET: u16 = 54324;
pub const BASE_PORT_SMTP: u16 = 54325;
pub const BASE_PORT_POP3: u16 = 54326;

/// Maximum length of a derived project id
const PROJECT_ID_MAX_LEN: usize = 50;

/// Offsets and identifiers assigned to one worktree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAssignment {
    /// Worktree name (static) or branch name (ephemeral)
    pub name: String,

    #[serde(rename = "nextjs-offset")]
    pub nextjs_offset: u16,

    #[serde(rename = "supabase-offset")]
    pub supabase_offset: u16,

    #[serde(rename = "project-id")]
    pub project_id: String,

    #[serde(rename = "is-static")]
    pub is_static: bool,
}

impl PortAssignment {
    /// Assignment for one of the long-lived static worktrees
    pub fn from_static(entry: &StaticWorktree) -> Self {
        Self {
            name: entry.name.clone(),
            nextjs_offset: entry.nextjs_offset,
            supabase_offset: entry.supabase_offset,
            project_id: entry.project_id.clone(),
            is_static: true,
        }
    }

    /// Assignment for an ephemeral branch worktree
    ///
    /// The Next.js offset is a tenth of the Supabase offset so both stay inside
    /// their service's port neighbourhood.
    pub fn ephemeral(branch: &str, supabase_offset: u16, project_prefix: &str) -> Self {
        Self {
            name: branch.to_string(),
            nextjs_offset: supabase_offset / 10,
            supabase_offset,
            project_id: branch_to_project_id(branch, project_prefix),
            is_static: false,
        }
    }

    pub fn nextjs_port(&self) -> u32 {
        u32::from(BASE_PORT_NEXTJS) + u32::from(self.nextjs_offset)
    }

    pub fn api_port(&self) -> u32 {
        self.supabase_port(BASE_PORT_API)
    }

    pub fn db_port(&self) -> u32 {
        self.supabase_port(BASE_PORT_DB)
    }

    pub fn shadow_port(&self) -> u32 {
        self.supabase_port(BASE_PORT_SHADOW)
    }

    pub fn pooler_port(&self) -> u32 {
        self.supabase_port(BASE_PORT_POOLER)
    }

    pub fn inbucket_port(&self) -> u32 {
        self.supabase_port(BASE_PORT_INBUCKET)
    }

    pub fn smtp_port(&self) -> u32 {
        self.supabase_port(BASE_PORT_SMTP)
    }

    pub fn pop3_port(&self) -> u32 {
        self.supabase_port(BASE_PORT_POP3)
    }

    pub fn site_url(&self) -> String {
        format!("http://localhost:{}", self.nextjs_port())
    }

    /// Every concrete port this assignment occupies
    pub fn all_ports(&self) -> [u32; 8] {
        [
            self.nextjs_port(),
            self.api_port(),
            self.db_port(),
            self.shadow_port(),
            self.pooler_port(),
            self.inbucket_port(),
            self.smtp_port(),
            self.pop3_port(),
        ]
    }

    fn supabase_port(&self, base: u16) -> u32 {
        u32::from(base) + u32::from(self.supabase_offset)
    }
}

/// Convert a branch name to a valid Supabase project id
///
/// Lowercase alphanumerics and hyphens only, no doubled hyphens, prefixed and
/// truncated to the Supabase limit.
pub fn branch_to_project_id(branch: &str, prefix: &str) -> String {
    let slug: String = branch
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' { c } else { '-' })
        .collect();

    let prefixed = collapse_hyphens(&format!("{}-{}", prefix, slug));
    let trimmed = prefixed.trim_matches('-');
    let truncated: String = trimmed.chars().take(PROJECT_ID_MAX_LEN).collect();
    truncated.trim_end_matches('-').to_string()
}

fn collapse_hyphens(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_entry(name: &str, nextjs: u16, supabase: u16, project_id: &str) -> StaticWorktree {
        StaticWorktree {
            name: name.to_string(),
            nextjs_offset: nextjs,
            supabase_offset: supabase,
            project_id: project_id.to_string(),
        }
    }

    #[test]
    fn test_main_worktree_ports() {
        let config = PortAssignment::from_static(&static_entry("PinPoint", 0, 0, "pinpoint"));

        assert_eq!(config.nextjs_port(), 3000);
        assert_eq!(config.api_port(), 54321);
        assert_eq!(config.db_port(), 54322);
        assert_eq!(config.shadow_port(), 54320);
        assert_eq!(config.pooler_port(), 54329);
        assert_eq!(config.inbucket_port(), 54324);
        assert_eq!(config.smtp_port(), 54325);
        assert_eq!(config.pop3_port(), 54326);
        assert_eq!(config.site_url(), "http://localhost:3000");
        assert!(config.is_static);
    }

    #[test]
    fn test_secondary_worktree_ports() {
        let config = PortAssignment::from_static(&static_entry("PinPoint-Secondary", 100, 1000, "pinpoint-secondary"));

        assert_eq!(config.nextjs_port(), 3100);
        assert_eq!(config.api_port(), 55321);
        assert_eq!(config.pooler_port(), 55329);
        assert_eq!(config.pop3_port(), 55326);
        assert_eq!(config.site_url(), "http://localhost:3100");
    }

    #[test]
    fn test_ephemeral_port_calculations() {
        let config = PortAssignment::ephemeral("test-worktree", 4000, "pinpoint");

        assert_eq!(config.nextjs_offset, 400);
        assert_eq!(config.nextjs_port(), 3400);
        assert_eq!(config.api_port(), 58321);
        assert_eq!(config.db_port(), 58322);
        assert_eq!(config.inbucket_port(), 58324);
        assert_eq!(config.smtp_port(), 58325);
        assert_eq!(config.site_url(), "http://localhost:3400");
        assert_eq!(config.project_id, "pinpoint-test-worktree");
        assert!(!config.is_static);
    }

    #[test]
    fn test_ports_within_assignment_are_distinct() {
        let config = PortAssignment::ephemeral("feat/x", 6900, "pinpoint");
        let mut ports = config.all_ports().to_vec();
        ports.sort_unstable();
        ports.dedup();
        assert_eq!(ports.len(), 8);
    }

    #[test]
    fn test_project_id_simple_branch() {
        assert_eq!(branch_to_project_id("my-feature", "pinpoint"), "pinpoint-my-feature");
    }

    #[test]
    fn test_project_id_with_slash() {
        assert_eq!(branch_to_project_id("feat/my-feature", "pinpoint"), "pinpoint-feat-my-feature");
    }

    #[test]
    fn test_project_id_uppercase_is_lowercased() {
        assert_eq!(branch_to_project_id("Fix/MyBug", "pinpoint"), "pinpoint-fix-mybug");
    }

    #[test]
    fn test_project_id_special_characters_replaced() {
        assert_eq!(
            branch_to_project_id("feat/add_new@feature!", "pinpoint"),
            "pinpoint-feat-add-new-feature"
        );
    }

    #[test]
    fn test_project_id_no_double_hyphens() {
        let result = branch_to_project_id("/my-feature", "pinpoint");
        assert!(!result.contains("--"));
        assert_eq!(result, "pinpoint-my-feature");
    }

    #[test]
    fn test_project_id_multiple_consecutive_special_chars() {
        assert_eq!(
            branch_to_project_id("feat///multiple___chars", "pinpoint"),
            "pinpoint-feat-multiple-chars"
        );
    }

    #[test]
    fn test_project_id_long_branch_truncated() {
        let result = branch_to_project_id(&"a-very-long-branch-name".repeat(5), "pinpoint");
        assert!(result.len() <= 50);
        assert!(!result.ends_with('-'));
    }

    #[test]
    fn test_project_id_trailing_special_chars_stripped() {
        let result = branch_to_project_id("feat/thing!!", "pinpoint");
        assert_eq!(result, "pinpoint-feat-thing");
    }
}
