//! Start: launch the project's dev server under the lifecycle manager.

use std::path::Path;

use damat_pkg::PackageAdapter;
use damat_process::{ExecOptions, HandleId, ProcessManager};
use tracing::info;

use super::ensure_live;
use crate::error::Result;

/// Spawn `script` in `dir` and hand the child to `process`.
///
/// Returns once the child is running. The manager stops it on termination,
/// and its exit terminates the run. `on_launched` runs after the spawn
/// succeeds and before the child is registered.
pub fn launch_dev_server<F>(
    packages: &dyn PackageAdapter,
    process: &ProcessManager,
    dir: &Path,
    script: &str,
    exec: &ExecOptions,
    on_launched: F,
) -> Result<HandleId>
where
    F: FnOnce(),
{
    ensure_live(exec)?;
    let exec = exec.clone().cwd(dir);
    let child = packages.spawn_script(script, &exec)?;
    info!(script = %script, pid = ?child.id(), "Dev server launched");
    on_launched();
    Ok(process.register_process(child, format!("{script} server")))
}
