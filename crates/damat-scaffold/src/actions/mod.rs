//! Scaffold actions run by the creation phases.

pub mod initialize;
pub mod prepare;
pub mod start;

use damat_process::ExecOptions;

use crate::error::{Result, ScaffoldError};

/// Fail with [`ScaffoldError::Cancelled`] once the run is cancelled.
pub(crate) fn ensure_live(exec: &ExecOptions) -> Result<()> {
    if exec.signal.is_cancelled() {
        Err(ScaffoldError::Cancelled)
    } else {
        Ok(())
    }
}
