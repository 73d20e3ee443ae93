//! Structured observability hooks for scaffold runs.
//!
//! - A run-scoped span, [`scaffold_span`]
//! - `emit_*` functions for phase and run lifecycle events

use std::fmt::Display;

use tracing::{info, warn, Span};

/// Run-scoped span carrying the run id and variant.
///
/// Attach it to the run's future rather than entering it, so it never leaks
/// into other tasks polled on the same thread:
///
/// ```ignore
/// creator.create().instrument(scaffold_span(&run_id, "project")).await;
/// ```
pub fn scaffold_span(run_id: &str, variant: &str) -> Span {
    tracing::info_span!("damat.create", run_id = %run_id, variant = %variant)
}

/// Emit event: a run started for `name`.
pub fn emit_run_started(run_id: &str, variant: &str, name: &str) {
    info!(event = "run.started", run_id = %run_id, variant = %variant, name = %name);
}

pub fn emit_phase_started(phase: &dyn Display) {
    info!(event = "phase.started", phase = %phase);
}

pub fn emit_phase_finished(phase: &dyn Display, duration_ms: u64) {
    info!(event = "phase.finished", phase = %phase, duration_ms = duration_ms);
}

/// Emit event: a phase failed (warning level). Cancellation is not a failure
/// and is reported through [`emit_run_finished`] instead.
pub fn emit_phase_failed(phase: &dyn Display, error: &dyn Display) {
    warn!(event = "phase.failed", phase = %phase, error = %error);
}

/// Emit event: the creation flow returned with `outcome`.
pub fn emit_run_finished(run_id: &str, outcome: &str, duration_ms: u64) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        outcome = %outcome,
        duration_ms = duration_ms,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    use tracing::Instrument;

    #[tokio::test]
    async fn test_scaffold_span_instruments_run() {
        let span = scaffold_span("run-1", "module");
        async {
            emit_run_started("run-1", "module", "damat-module");
            emit_phase_started(&"initialize");
            emit_phase_finished(&"initialize", 12);
            emit_phase_failed(&"prepare", &"boom");
            emit_run_finished("run-1", "failed", 40);
        }
        .instrument(span)
        .await;
        assert!(Span::current().is_none());
    }
}
