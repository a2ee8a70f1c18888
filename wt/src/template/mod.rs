//! Config artifact generation from the shared template
//!
//! The template is a TOML file with stock Supabase ports. Rendering swaps in
//! the worktree's ports and project id, one `(section, key)` target at a time,
//! and prefixes a generation banner. The same targets drive drift detection
//! and in-place repair of an existing artifact.

mod section;

pub use section::{apply_in_section, read_value};

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::ports::PortAssignment;

/// Banner written above every generated artifact
pub const CONFIG_BANNER: &str = "# ⚠️ AUTO-GENERATED - DO NOT EDIT ⚠️
# Managed by: pinpoint-wt
# To modify: Edit supabase/config.toml.template, then run `pinpoint-wt sync`
#
";

/// Template errors
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {}", path.display())]
    Missing { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A target value and how it is spelled in the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetValue {
    Integer(u32),
    Quoted(String),
}

impl TargetValue {
    /// Literal token as written into the file
    pub fn token(&self) -> String {
        match self {
            Self::Integer(n) => n.to_string(),
            Self::Quoted(s) => format!("\"{}\"", s),
        }
    }

    /// Value as `read_value` reports it
    pub fn plain(&self) -> String {
        match self {
            Self::Integer(n) => n.to_string(),
            Self::Quoted(s) => s.clone(),
        }
    }
}

/// One substitution: `key` inside `section` (`None` = root table)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub section: Option<&'static str>,
    pub key: &'static str,
    pub label: &'static str,
    pub value: TargetValue,
}

/// A target whose current value differs from the expected one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    pub label: &'static str,
    pub current: Option<String>,
    pub expected: String,
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.current.as_deref().unwrap_or("missing");
        write!(f, "{}: {} → {}", self.label, current, self.expected)
    }
}

/// Every value the artifact must carry for `assignment`
pub fn targets(assignment: &PortAssignment) -> Vec<Target> {
    use TargetValue::{Integer, Quoted};

    let target = |section, key, label, value| Target {
        section,
        key,
        label,
        value,
    };

    vec![
        target(None, "project_id", "project_id", Quoted(assignment.project_id.clone())),
        target(Some("api"), "port", "api.port", Integer(assignment.api_port())),
        target(Some("db"), "port", "db.port", Integer(assignment.db_port())),
        target(Some("db"), "shadow_port", "db.shadow_port", Integer(assignment.shadow_port())),
        target(Some("db.pooler"), "port", "db.pooler.port", Integer(assignment.pooler_port())),
        target(Some("inbucket"), "port", "inbucket.port", Integer(assignment.inbucket_port())),
        target(Some("inbucket"), "smtp_port", "inbucket.smtp_port", Integer(assignment.smtp_port())),
        target(Some("inbucket"), "pop3_port", "inbucket.pop3_port", Integer(assignment.pop3_port())),
        target(Some("auth"), "site_url", "auth.site_url", Quoted(assignment.site_url())),
    ]
}

fn substitute(content: &str, assignment: &PortAssignment) -> String {
    targets(assignment).iter().fold(content.to_string(), |acc, t| {
        apply_in_section(&acc, t.section, t.key, &t.value.token())
    })
}

/// Render the artifact from the template text
pub fn render(template: &str, assignment: &PortAssignment) -> String {
    debug!(name = %assignment.name, "template::render: called");
    format!("{}{}", CONFIG_BANNER, substitute(template, assignment))
}

/// Differences between an existing artifact and what `assignment` requires
pub fn drift(content: &str, assignment: &PortAssignment) -> Vec<Drift> {
    targets(assignment)
        .into_iter()
        .filter_map(|t| {
            let current = read_value(content, t.section, t.key);
            let expected = t.value.plain();
            (current.as_deref() != Some(expected.as_str())).then_some(Drift {
                label: t.label,
                current,
                expected,
            })
        })
        .collect()
}

/// Repair an existing artifact in place; the banner is left as found
pub fn reconcile(content: &str, assignment: &PortAssignment) -> String {
    debug!(name = %assignment.name, "template::reconcile: called");
    substitute(content, assignment)
}

/// Read the shared template; a missing template is an error, never a default
pub fn load_template(path: &Path) -> Result<String, TemplateError> {
    debug!(path = %path.display(), "template::load_template: called");
    if !path.exists() {
        return Err(TemplateError::Missing { path: path.to_path_buf() });
    }
    fs::read_to_string(path).map_err(|source| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a generated file and leave it read-only
///
/// An existing file gets owner write back before the rewrite.
pub fn write_protected(path: &Path, content: &str) -> Result<(), TemplateError> {
    debug!(path = %path.display(), "template::write_protected: called");
    let io_err = |source| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    };
    if path.exists() {
        set_mode(path, 0o644).map_err(io_err)?;
    }
    fs::write(path, content).map_err(io_err)?;
    set_mode(path, 0o444).map_err(io_err)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)
}
