//! The package manager seam consumed by the scaffold phases.

use async_trait::async_trait;
use damat_process::ExecOptions;
use tokio::process::Child;

use crate::error::Result;
use crate::manager::PackageManager;
use crate::tool::PackageTool;

/// Operations the creation flow needs from a package manager.
#[async_trait]
pub trait PackageAdapter: Send + Sync {
    /// Resolve the tool to use.
    async fn detect(&self, exec: &ExecOptions) -> Result<PackageTool>;

    /// Install dependencies in `exec.cwd`.
    async fn install_dependencies(&self, exec: &ExecOptions) -> Result<()>;

    /// Command string that runs a script; fails until a tool is resolved.
    fn get_command_str(&self, script: &str) -> Result<String>;

    /// `"<tool>@<version>"`, or `None` to omit the manifest field.
    fn get_package_manager_string(&self) -> Option<String>;

    /// Start a long-running script.
    fn spawn_script(&self, script: &str, exec: &ExecOptions) -> Result<Child>;
}

#[async_trait]
impl PackageAdapter for PackageManager {
    async fn detect(&self, exec: &ExecOptions) -> Result<PackageTool> {
        PackageManager::detect(self, exec).await
    }

    async fn install_dependencies(&self, exec: &ExecOptions) -> Result<()> {
        PackageManager::install_dependencies(self, exec).await
    }

    fn get_command_str(&self, script: &str) -> Result<String> {
        PackageManager::get_command_str(self, script)
    }

    fn get_package_manager_string(&self) -> Option<String> {
        PackageManager::get_package_manager_string(self)
    }

    fn spawn_script(&self, script: &str, exec: &ExecOptions) -> Result<Child> {
        PackageManager::spawn_script(self, script, exec)
    }
}
