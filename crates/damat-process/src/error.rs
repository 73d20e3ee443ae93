//! Error taxonomy for command execution and the process lifecycle.

/// Errors produced while running external commands.
///
/// `Cancelled` is a first-class outcome rather than a failure: callers are
/// expected to match on it and hand it up unchanged.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("operation cancelled by user")]
    Cancelled,

    #[error("`{command}` exited with code {exit_code}: {stderr}")]
    Command {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("dependency resolution failed for `{command}`: {detail}")]
    TransientResolution { command: String, detail: String },

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command line is empty")]
    EmptyCommand,

    #[error(transparent)]
    Fatal(Box<ProcessError>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    /// Whether this error is the cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProcessError::Cancelled)
    }

    /// Captured stderr for command failures, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ProcessError::Command { stderr, .. } => Some(stderr),
            ProcessError::Fatal(inner) => inner.stderr(),
            _ => None,
        }
    }
}

/// Result type for process operations.
pub type Result<T> = std::result::Result<T, ProcessError>;
