//! Initialize: clone the template and give it a fresh history.

use std::path::Path;

use damat_process::{execute, CommandLine, ExecOptions, ProcessError};
use tracing::{debug, info, warn};

use super::ensure_live;
use crate::error::{Result, ScaffoldError};
use crate::vcs::Vcs;

/// Remove the template's VCS metadata from `dir`.
///
/// Each directory is removed with the filesystem API first and with a shell
/// command if that fails. A `.git` directory that survives both is an error;
/// a surviving `.github` directory only logs a warning.
pub async fn strip_vcs_metadata(dir: &Path, exec: &ExecOptions) -> Result<()> {
    if !remove_dir(dir, ".git", exec).await? {
        return Err(ScaffoldError::Vcs(format!(
            "could not remove template history at {}",
            dir.join(".git").display()
        )));
    }
    if !remove_dir(dir, ".github", exec).await? {
        warn!(dir = %dir.display(), "Template .github directory could not be removed");
    }
    Ok(())
}

/// Returns whether `dir/name` is gone afterwards.
async fn remove_dir(dir: &Path, name: &str, exec: &ExecOptions) -> Result<bool> {
    ensure_live(exec)?;
    let path = dir.join(name);
    if tokio::fs::symlink_metadata(&path).await.is_err() {
        return Ok(true);
    }

    match tokio::fs::remove_dir_all(&path).await {
        Ok(()) => return Ok(true),
        Err(err) => debug!(path = %path.display(), error = %err, "Filesystem removal failed, retrying with shell"),
    }

    let command = removal_command(&path);
    match execute(&command, exec).await {
        Ok(_) => {}
        Err(ProcessError::Cancelled) => return Err(ScaffoldError::Cancelled),
        Err(err) => debug!(command = %command, error = %err, "Shell removal failed"),
    }
    Ok(tokio::fs::symlink_metadata(&path).await.is_err())
}

fn removal_command(path: &Path) -> CommandLine {
    let target = path.to_string_lossy();
    if cfg!(windows) {
        CommandLine::new("cmd").args(["/c", "rmdir", "/s", "/q"]).arg(target)
    } else {
        CommandLine::new("rm").arg("-rf").arg(target)
    }
}

/// Clone `url` into `dest`, strip its metadata and start a fresh history.
pub async fn initialize_from_template(
    vcs: &dyn Vcs,
    url: &str,
    dest: &Path,
    exec: &ExecOptions,
) -> Result<()> {
    ensure_live(exec)?;
    info!(url = %url, dest = %dest.display(), "Cloning template");
    vcs.clone_repo(url, dest, exec).await?;
    strip_vcs_metadata(dest, exec).await?;
    vcs.init_history(dest, exec).await?;
    Ok(())
}
