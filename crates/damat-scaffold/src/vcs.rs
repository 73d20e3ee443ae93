//! Version control actions: template acquisition and fresh history.

use std::path::Path;

use async_trait::async_trait;
use damat_process::{execute, CommandLine, ExecOptions, ProcessError};
use tracing::debug;

use crate::error::{Result, ScaffoldError};

/// Version control operations used by the Initialize phase.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Clone `url` into `dest`.
    async fn clone_repo(&self, url: &str, dest: &Path, exec: &ExecOptions) -> Result<()>;

    /// Start a fresh history in `dir` with a single baseline commit.
    async fn init_history(&self, dir: &Path, exec: &ExecOptions) -> Result<()>;
}

/// [`Vcs`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    branch: String,
    message: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("main", "chore: bootstrap project structure")
    }
}

impl GitCli {
    pub fn new(branch: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            message: message.into(),
        }
    }

    /// Run one history step. Failures other than cancellation are logged and
    /// ignored so the next step still runs.
    async fn tolerant_step(&self, command: CommandLine, exec: &ExecOptions) -> Result<()> {
        match execute(&command, exec).await {
            Ok(_) => Ok(()),
            Err(ProcessError::Cancelled) => Err(ScaffoldError::Cancelled),
            Err(err) => {
                debug!(command = %command, error = %err, "Skipping failed history step");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn clone_repo(&self, url: &str, dest: &Path, exec: &ExecOptions) -> Result<()> {
        let command = CommandLine::new("git")
            .arg("clone")
            .arg(url)
            .arg(dest.to_string_lossy())
            .args(["--depth", "1"]);

        match execute(&command, exec).await {
            Ok(_) => Ok(()),
            Err(ProcessError::Cancelled) => Err(ScaffoldError::Cancelled),
            Err(err) => Err(ScaffoldError::Clone {
                url: url.to_string(),
                detail: err
                    .stderr()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| err.to_string()),
            }),
        }
    }

    async fn init_history(&self, dir: &Path, exec: &ExecOptions) -> Result<()> {
        let exec = exec.clone().cwd(dir);
        self.tolerant_step(
            CommandLine::new("git").args(["init", "-b", self.branch.as_str()]),
            &exec,
        )
        .await?;
        self.tolerant_step(CommandLine::new("git").args(["add", "."]), &exec)
            .await?;
        self.tolerant_step(
            CommandLine::new("git").args(["commit", "-m", self.message.as_str()]),
            &exec,
        )
        .await
    }
}
