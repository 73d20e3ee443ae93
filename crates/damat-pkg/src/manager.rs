//! Package manager resolution and uniform operations over the executor.

use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use damat_process::{
    execute, spawn, ExecOptions, ExecutionResult, ProcessError, ProcessManager, RunOptions,
};
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::error::{PackageError, Result};
use crate::tool::{detect_from_user_agent, major_version, PackageTool};

/// Caller-supplied inputs to package manager detection.
#[derive(Debug, Clone, Default)]
pub struct PackageManagerOptions {
    /// Stream install and script output.
    pub verbose: bool,
    pub use_npm: bool,
    pub use_pnpm: bool,
    pub use_bun: bool,
    /// Raw `npm_config_user_agent` value, if the launcher set one.
    pub user_agent: Option<String>,
}

impl PackageManagerOptions {
    /// Tool forced by an explicit flag. npm wins over pnpm, pnpm over bun.
    pub fn forced_tool(&self) -> Option<PackageTool> {
        if self.use_npm {
            Some(PackageTool::Npm)
        } else if self.use_pnpm {
            Some(PackageTool::Pnpm)
        } else if self.use_bun {
            Some(PackageTool::Bun)
        } else {
            None
        }
    }
}

/// What has been resolved so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageManagerState {
    pub tool: Option<PackageTool>,
    pub version: Option<String>,
}

impl PackageManagerState {
    pub fn is_resolved(&self) -> bool {
        self.tool.is_some()
    }
}

/// Resolves the active package-management tool and runs its commands.
pub struct PackageManager {
    process: ProcessManager,
    options: PackageManagerOptions,
    state: RwLock<PackageManagerState>,
}

impl std::fmt::Debug for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageManager")
            .field("options", &self.options)
            .field("state", &self.state())
            .finish()
    }
}

impl PackageManager {
    pub fn new(process: ProcessManager, options: PackageManagerOptions) -> Self {
        Self {
            process,
            options,
            state: RwLock::new(PackageManagerState::default()),
        }
    }

    /// Manager with a tool already resolved, skipping detection.
    pub fn with_tool(
        process: ProcessManager,
        options: PackageManagerOptions,
        tool: PackageTool,
        version: Option<String>,
    ) -> Self {
        let manager = Self::new(process, options);
        *manager.write_state() = PackageManagerState {
            tool: Some(tool),
            version,
        };
        manager
    }

    fn read_state(&self) -> RwLockReadGuard<'_, PackageManagerState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, PackageManagerState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> PackageManagerState {
        self.read_state().clone()
    }

    /// The resolved tool, `None` until [`PackageManager::detect`] succeeds.
    pub fn tool(&self) -> Option<PackageTool> {
        self.read_state().tool
    }

    fn require_tool(&self) -> Result<PackageTool> {
        self.tool().ok_or(PackageError::NotConfigured)
    }

    /// Resolve the tool to use.
    ///
    /// Detection order: explicit override, then the user agent, then the
    /// baseline tool. The chosen tool is always probed with `<tool> -v`; a
    /// probed version is kept only when the user agent did not supply one.
    /// The run stops with [`PackageError::NoUsableTool`] only when neither
    /// source produced a version.
    pub async fn detect(&self, exec: &ExecOptions) -> Result<PackageTool> {
        let agent = detect_from_user_agent(self.options.user_agent.as_deref());
        let (tool, source) = match self.options.forced_tool() {
            Some(forced) => (forced, "override"),
            None => (agent.tool, "user agent"),
        };
        let known = if agent.tool == tool { agent.version } else { None };
        debug!(tool = %tool, source, version = ?known, "Selected package manager");

        let probed = self
            .process
            .run_process(RunOptions::tolerant(), || self.probe_version(tool, exec))
            .await?
            .flatten();

        let version = match (known, probed) {
            (Some(version), _) => version,
            (None, Some(version)) => version,
            (None, None) => {
                return Err(PackageError::NoUsableTool {
                    tool: tool.name().to_string(),
                })
            }
        };

        if let Some(minimum) = tool.minimum_major_version() {
            match major_version(&version) {
                Some(major) if major >= minimum => {}
                _ => {
                    return Err(PackageError::UnsupportedVersion {
                        tool: tool.name().to_string(),
                        found: version,
                        minimum,
                    })
                }
            }
        }

        info!(tool = %tool, version = %version, "Resolved package manager");
        *self.write_state() = PackageManagerState {
            tool: Some(tool),
            version: Some(version),
        };
        Ok(tool)
    }

    async fn probe_version(
        &self,
        tool: PackageTool,
        exec: &ExecOptions,
    ) -> damat_process::Result<Option<String>> {
        let opts = exec.clone().verbose(false);
        match execute(&tool.version_command(), &opts).await {
            Ok(output) => {
                let version = output.stdout.trim().trim_start_matches('v').to_string();
                debug!(tool = %tool, version = %version, "Probed package manager version");
                Ok(Some(version).filter(|v| !v.is_empty()))
            }
            Err(ProcessError::Cancelled) => Err(ProcessError::Cancelled),
            Err(err) => {
                debug!(tool = %tool, error = %err, "Failed to probe package manager version");
                Ok(None)
            }
        }
    }

    /// Command string that runs `script` with the resolved tool.
    pub fn get_command_str(&self, script: &str) -> Result<String> {
        Ok(self.require_tool()?.run_script_command(script).to_string())
    }

    /// `"<tool>@<version>"` for the manifest `packageManager` field, or `None`
    /// when no version is known.
    pub fn get_package_manager_string(&self) -> Option<String> {
        let state = self.read_state();
        match (&state.tool, &state.version) {
            (Some(tool), Some(version)) => Some(format!("{}@{}", tool.name(), version)),
            _ => {
                debug!("No package manager version known");
                None
            }
        }
    }

    /// Install dependencies with the resolved tool.
    ///
    /// Lock files of other tools in the working directory are removed first.
    /// Transient resolution failures are tolerated.
    pub async fn install_dependencies(&self, exec: &ExecOptions) -> Result<()> {
        let tool = self.require_tool()?;
        if exec.signal.is_cancelled() {
            return Err(PackageError::Cancelled);
        }
        if let Some(dir) = &exec.cwd {
            remove_foreign_lock_files(dir, tool).await?;
        }

        let command = tool.install_command();
        let opts = exec.clone().verbose(self.options.verbose);
        info!(command = %command, "Installing dependencies");
        let installed = self
            .process
            .run_process(RunOptions::tolerant(), || execute(&command, &opts))
            .await?;
        if installed.is_none() {
            warn!(command = %command, "Install finished with tolerated resolution errors");
        }
        Ok(())
    }

    /// Run a `package.json` script to completion.
    pub async fn run_script(
        &self,
        script: &str,
        exec: &ExecOptions,
    ) -> Result<Option<ExecutionResult>> {
        let command = self.require_tool()?.run_script_command(script);
        let opts = exec.clone().verbose(self.options.verbose);
        Ok(self
            .process
            .run_process(RunOptions::tolerant(), || execute(&command, &opts))
            .await?)
    }

    /// Run the framework CLI (`damat <args>`) through the project's scripts.
    pub async fn run_framework_command(
        &self,
        args: &[&str],
        exec: &ExecOptions,
    ) -> Result<Option<ExecutionResult>> {
        let command = self.require_tool()?.framework_command(args);
        let opts = exec.clone().verbose(self.options.verbose);
        Ok(self
            .process
            .run_process(RunOptions::tolerant(), || execute(&command, &opts))
            .await?)
    }

    /// Start a long-running script without waiting for it.
    pub fn spawn_script(&self, script: &str, exec: &ExecOptions) -> Result<Child> {
        let command = self.require_tool()?.run_script_command(script);
        let opts = exec.clone().verbose(self.options.verbose);
        Ok(spawn(&command, &opts)?)
    }
}

/// Remove lock files that belong to tools other than `keep`.
///
/// Returns the paths that were removed.
pub async fn remove_foreign_lock_files(dir: &Path, keep: PackageTool) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for tool in PackageTool::ALL.into_iter().filter(|tool| *tool != keep) {
        for file in tool.lock_files() {
            let path = dir.join(file);
            let metadata = match tokio::fs::symlink_metadata(&path).await {
                Ok(metadata) => metadata,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            if metadata.is_dir() {
                tokio::fs::remove_dir_all(&path).await?;
            } else {
                tokio::fs::remove_file(&path).await?;
            }
            debug!(path = %path.display(), owner = %tool, "Removed foreign lock file");
            removed.push(path);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use damat_process::CancellationToken;

    fn options_with_agent(agent: &str) -> PackageManagerOptions {
        PackageManagerOptions {
            user_agent: Some(agent.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_forced_tool_priority() {
        let all = PackageManagerOptions {
            use_npm: true,
            use_pnpm: true,
            use_bun: true,
            ..Default::default()
        };
        assert_eq!(all.forced_tool(), Some(PackageTool::Npm));

        let two = PackageManagerOptions {
            use_pnpm: true,
            use_bun: true,
            ..Default::default()
        };
        assert_eq!(two.forced_tool(), Some(PackageTool::Pnpm));
        assert_eq!(PackageManagerOptions::default().forced_tool(), None);
    }

    #[test]
    fn test_get_command_str_requires_resolution() {
        let manager = PackageManager::new(ProcessManager::new(), PackageManagerOptions::default());
        assert!(matches!(
            manager.get_command_str("dev"),
            Err(PackageError::NotConfigured)
        ));
        assert_eq!(manager.tool(), None);
    }

    #[test]
    fn test_get_command_str_per_tool() {
        let cases = [
            (PackageTool::Npm, "test", "npm run test"),
            (PackageTool::Pnpm, "build", "pnpm build"),
            (PackageTool::Bun, "dev", "bun run dev"),
        ];
        for (tool, script, expected) in cases {
            let manager = PackageManager::with_tool(
                ProcessManager::new(),
                PackageManagerOptions::default(),
                tool,
                None,
            );
            assert_eq!(manager.get_command_str(script).unwrap(), expected);
        }
    }

    #[test]
    fn test_package_manager_string() {
        let manager = PackageManager::with_tool(
            ProcessManager::new(),
            PackageManagerOptions::default(),
            PackageTool::Bun,
            Some("4.9.0".to_string()),
        );
        assert_eq!(manager.get_package_manager_string().as_deref(), Some("bun@4.9.0"));

        let unversioned = PackageManager::with_tool(
            ProcessManager::new(),
            PackageManagerOptions::default(),
            PackageTool::Npm,
            None,
        );
        assert_eq!(unversioned.get_package_manager_string(), None);
    }

    #[tokio::test]
    async fn test_detect_uses_user_agent_version() {
        let process = ProcessManager::new();
        let manager = PackageManager::new(process.clone(), options_with_agent("pnpx/8.0.0 node/v20"));
        let tool = manager
            .detect(&ExecOptions::new(process.token()))
            .await
            .unwrap();

        assert_eq!(tool, PackageTool::Pnpm);
        assert_eq!(manager.state().version.as_deref(), Some("8.0.0"));
        assert_eq!(manager.get_command_str("build").unwrap(), "pnpm build");
        assert_eq!(manager.get_package_manager_string().as_deref(), Some("pnpm@8.0.0"));
    }

    #[tokio::test]
    async fn test_detect_rejects_old_bun() {
        let process = ProcessManager::new();
        let manager = PackageManager::new(process.clone(), options_with_agent("bun/0.8.1"));
        let err = manager
            .detect(&ExecOptions::new(process.token()))
            .await
            .unwrap_err();

        match err {
            PackageError::UnsupportedVersion { tool, found, minimum } => {
                assert_eq!(tool, "bun");
                assert_eq!(found, "0.8.1");
                assert_eq!(minimum, 1);
            }
            other => panic!("expected UnsupportedVersion, got {:?}", other),
        }
        assert!(!manager.state().is_resolved());
    }

    #[tokio::test]
    async fn test_detect_propagates_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let manager = PackageManager::new(ProcessManager::new(), options_with_agent("pnpm/8.0.0"));
        let err = manager.detect(&ExecOptions::new(token)).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!manager.state().is_resolved());
    }

    #[tokio::test]
    async fn test_install_requires_resolution() {
        let manager = PackageManager::new(ProcessManager::new(), PackageManagerOptions::default());
        let err = manager
            .install_dependencies(&ExecOptions::new(CancellationToken::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, PackageError::NotConfigured));
    }

    #[tokio::test]
    async fn test_cancelled_install_leaves_directory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package-lock.json"), "{}").unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let manager = PackageManager::with_tool(
            ProcessManager::new(),
            PackageManagerOptions::default(),
            PackageTool::Bun,
            None,
        );
        let err = manager
            .install_dependencies(&ExecOptions::new(token).cwd(dir.path()))
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(dir.path().join("package-lock.json").exists());
    }

    #[tokio::test]
    async fn test_remove_foreign_lock_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package-lock.json"), "{}").unwrap();
        std::fs::write(dir.path().join("pnpm-lock.yaml"), "").unwrap();
        std::fs::write(dir.path().join("bun.lock"), "").unwrap();
        std::fs::create_dir(dir.path().join(".bun")).unwrap();
        std::fs::write(dir.path().join(".bun").join("cache"), "").unwrap();

        let removed = remove_foreign_lock_files(dir.path(), PackageTool::Pnpm)
            .await
            .unwrap();

        assert_eq!(removed.len(), 3);
        assert!(!dir.path().join("package-lock.json").exists());
        assert!(!dir.path().join("bun.lock").exists());
        assert!(!dir.path().join(".bun").exists());
        assert!(dir.path().join("pnpm-lock.yaml").exists());
    }

    #[tokio::test]
    async fn test_remove_foreign_lock_files_in_clean_dir() {
        let dir = tempfile::tempdir().unwrap();
        let removed = remove_foreign_lock_files(dir.path(), PackageTool::Npm)
            .await
            .unwrap();
        assert!(removed.is_empty());
    }

    #[tokio::test]
    async fn test_run_script_requires_resolution() {
        let manager = PackageManager::new(ProcessManager::new(), PackageManagerOptions::default());
        let opts = ExecOptions::new(CancellationToken::new());
        assert!(matches!(
            manager.run_script("dev", &opts).await,
            Err(PackageError::NotConfigured)
        ));
        assert!(matches!(
            manager.run_framework_command(&["build"], &opts).await,
            Err(PackageError::NotConfigured)
        ));
        assert!(matches!(
            manager.spawn_script("dev", &opts),
            Err(PackageError::NotConfigured)
        ));
    }
}
