//! damat-process - run lifecycle and command execution
//!
//! Provides the process-orchestration core used by `create-damat-app`:
//! - a cancellable command executor (`execute`, `spawn`)
//! - a lifecycle manager owning the shared cancellation token, managed
//!   handles (tickers, spawned processes) and termination callbacks
//! - a recurring `Ticker` for status refreshes

pub mod command;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod ticker;

// Re-export key types
pub use command::{CommandLine, ExecOptions};
pub use error::{ProcessError, Result};
pub use executor::{execute, spawn, ExecutionResult};
pub use lifecycle::{
    ManagedHandle, ProcessHandle, ProcessManager, RunOptions, TerminationCallback,
    TerminationReason, DEFAULT_TRANSIENT_MARKERS,
};
pub use ticker::{HandleId, Ticker};
pub use tokio_util::sync::CancellationToken;
