//! Error types for damat-pkg

use damat_process::ProcessError;
use thiserror::Error;

/// Errors that can occur while resolving or driving a package manager
#[derive(Error, Debug)]
pub enum PackageError {
    /// The run was cancelled while a package manager command was in flight
    #[error("operation cancelled by user")]
    Cancelled,

    /// No package manager has been resolved yet
    #[error("Package manager not set")]
    NotConfigured,

    /// The selected tool could not be found or probed
    #[error("no usable package manager: `{tool}` is not installed or not in PATH")]
    NoUsableTool { tool: String },

    /// The detected tool is older than the minimum supported version
    #[error("{tool} v{found} is not supported, at least v{minimum} is required")]
    UnsupportedVersion {
        tool: String,
        found: String,
        minimum: u64,
    },

    /// A package manager command failed
    #[error(transparent)]
    Process(ProcessError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for package manager operations
pub type Result<T> = std::result::Result<T, PackageError>;

impl PackageError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PackageError::Cancelled)
    }
}

impl From<ProcessError> for PackageError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Cancelled => PackageError::Cancelled,
            other => PackageError::Process(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_not_wrapped() {
        let err: PackageError = ProcessError::Cancelled.into();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_command_failure_is_wrapped() {
        let err: PackageError = ProcessError::EmptyCommand.into();
        assert!(matches!(err, PackageError::Process(ProcessError::EmptyCommand)));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_not_configured_message() {
        assert_eq!(PackageError::NotConfigured.to_string(), "Package manager not set");
    }
}
