//! Per-worktree record of the assigned ports

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ports::PortAssignment;

/// Contents of the metadata file written into each provisioned worktree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeMetadata {
    #[serde(flatten)]
    pub assignment: PortAssignment,

    #[serde(rename = "allocated-at")]
    pub allocated_at: DateTime<Utc>,
}

impl WorktreeMetadata {
    pub fn new(assignment: PortAssignment) -> Self {
        Self {
            assignment,
            allocated_at: Utc::now(),
        }
    }

    /// Load the record; `Ok(None)` when the file does not exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        debug!(?path, "WorktreeMetadata::load: called");
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
        let metadata = serde_yaml::from_str(&content).context(format!("Failed to parse {}", path.display()))?;
        Ok(Some(metadata))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        debug!(?path, "WorktreeMetadata::save: called");
        let content = serde_yaml::to_string(self).context("Failed to serialize worktree metadata")?;
        fs::write(path, content).context(format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(".pinpoint-ports.yml");
        let metadata = WorktreeMetadata::new(PortAssignment::ephemeral("feat/x", 6900, "pinpoint"));

        metadata.save(&path).unwrap();
        let loaded = WorktreeMetadata::load(&path).unwrap().unwrap();

        assert_eq!(loaded, metadata);
        assert_eq!(loaded.assignment.supabase_offset, 6900);
    }

    #[test]
    fn test_file_layout() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(".pinpoint-ports.yml");
        WorktreeMetadata::new(PortAssignment::ephemeral("feat/x", 6900, "pinpoint"))
            .save(&path)
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("supabase-offset: 6900"));
        assert!(content.contains("project-id: pinpoint-feat-x"));
        assert!(content.contains("allocated-at:"));
    }

    #[test]
    fn test_load_missing() {
        let temp = tempdir().unwrap();
        assert!(WorktreeMetadata::load(&temp.path().join("nope.yml")).unwrap().is_none());
    }

    #[test]
    fn test_load_invalid() {
        let temp = tempdir().unwrap();
        let path = temp.path().join(".pinpoint-ports.yml");
        fs::write(&path, "not: [valid").unwrap();
        assert!(WorktreeMetadata::load(&path).is_err());
    }
}
