//! External command errors

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failure of an external tool invocation
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with code {code}: {stderr}")]
    Failed { program: String, code: i32, stderr: String },

    #[error("{program} timed out after {}s", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("Unexpected output from {program}: {detail}")]
    Parse { program: String, detail: String },
}

impl CommandError {
    /// The program itself is not installed
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
