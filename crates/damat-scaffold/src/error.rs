//! Error taxonomy for scaffold actions and the creation flow.

use std::path::PathBuf;

use damat_pkg::PackageError;
use damat_process::ProcessError;

/// Errors produced while creating a project or module.
#[derive(Debug, thiserror::Error)]
pub enum ScaffoldError {
    /// The run was cancelled. Never reported as a failure.
    #[error("operation cancelled by user")]
    Cancelled,

    #[error("failed to clone {url}: {detail}")]
    Clone { url: String, detail: String },

    #[error("vcs error: {0}")]
    Vcs(String),

    #[error("invalid manifest {path}: {detail}")]
    Manifest { path: PathBuf, detail: String },

    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Unrecoverable condition reported to the user as-is.
    #[error("{0}")]
    FatalUser(String),

    #[error(transparent)]
    Package(PackageError),

    #[error(transparent)]
    Process(ProcessError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for scaffold operations.
pub type Result<T> = std::result::Result<T, ScaffoldError>;

impl ScaffoldError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScaffoldError::Cancelled)
    }
}

impl From<ProcessError> for ScaffoldError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Cancelled => ScaffoldError::Cancelled,
            other => ScaffoldError::Process(other),
        }
    }
}

impl From<PackageError> for ScaffoldError {
    fn from(err: PackageError) -> Self {
        match err {
            PackageError::Cancelled => ScaffoldError::Cancelled,
            err @ (PackageError::NoUsableTool { .. } | PackageError::UnsupportedVersion { .. }) => {
                ScaffoldError::FatalUser(err.to_string())
            }
            other => ScaffoldError::Package(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_maps_through_every_layer() {
        assert!(ScaffoldError::from(ProcessError::Cancelled).is_cancelled());
        assert!(ScaffoldError::from(PackageError::Cancelled).is_cancelled());
        assert!(ScaffoldError::from(PackageError::from(ProcessError::Cancelled)).is_cancelled());
    }

    #[test]
    fn test_missing_tool_is_user_facing() {
        let err = ScaffoldError::from(PackageError::NoUsableTool {
            tool: "bun".to_string(),
        });
        match err {
            ScaffoldError::FatalUser(message) => assert!(message.contains("bun")),
            other => panic!("expected FatalUser, got {:?}", other),
        }
    }

    #[test]
    fn test_scaffold_error_display() {
        let err = ScaffoldError::Clone {
            url: "https://example.com/repo".to_string(),
            detail: "repository not found".to_string(),
        };
        assert!(err.to_string().contains("failed to clone"));

        let err = ScaffoldError::from(PackageError::NotConfigured);
        assert_eq!(err.to_string(), "Package manager not set");
    }
}
