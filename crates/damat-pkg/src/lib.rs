//! damat-pkg: package manager adapter for create-damat-app
//!
//! Resolves which package-management tool (npm, pnpm or bun) drives a run
//! and exposes uniform operations over the command executor:
//!
//! - detection from explicit flags, the launcher's user agent, or a version probe
//! - dependency installation with lock-file hygiene and transient-error tolerance
//! - script command formatting and long-running script spawning

pub mod adapter;
pub mod error;
pub mod manager;
pub mod tool;

pub use adapter::PackageAdapter;
pub use error::{PackageError, Result};
pub use manager::{
    remove_foreign_lock_files, PackageManager, PackageManagerOptions, PackageManagerState,
};
pub use tool::{detect_from_user_agent, major_version, PackageTool, UserAgentMatch};
