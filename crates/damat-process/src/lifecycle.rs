//! Run lifecycle management.
//!
//! [`ProcessManager`] is the single authority on whether a run is still alive
//! and on what happens when it ends. It owns:
//!
//! - the shared [`CancellationToken`] handed to every command,
//! - a registry of managed handles (tickers and spawned processes),
//! - the ordered list of termination callbacks.
//!
//! Termination is triggered by the first Ctrl-C, by a registered process
//! exiting, or explicitly by the caller. Whatever the trigger, the sequence is
//! the same and runs exactly once: cancel the token, clear every ticker, stop
//! every process, run the callbacks in registration order, publish the exit
//! code.

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ProcessError, Result};
use crate::ticker::{next_handle_id, HandleId, Ticker};

/// Markers in stderr that identify a transient dependency resolution failure.
pub const DEFAULT_TRANSIENT_MARKERS: &[&str] = &["ERESOLVE"];

/// How long the interrupt listener outlives a termination it did not cause.
const INTERRUPT_GRACE: Duration = Duration::from_millis(250);

/// Why the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The run finished normally.
    Completed,
    /// The user interrupted the run.
    Interrupted,
    /// The run stopped on an unrecoverable error.
    Fatal,
}

impl TerminationReason {
    /// Process exit code for this reason.
    pub fn exit_code(self) -> i32 {
        match self {
            TerminationReason::Completed => 0,
            TerminationReason::Interrupted => 130,
            TerminationReason::Fatal => 1,
        }
    }
}

/// Deferred action run exactly once when the run terminates.
pub type TerminationCallback = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// A spawned process owned by the manager.
#[derive(Debug)]
pub struct ProcessHandle {
    pub id: HandleId,
    pub label: String,
    pub pid: Option<u32>,
    stop: CancellationToken,
    watcher: Option<JoinHandle<()>>,
}

/// Background work the manager must be able to stop.
#[derive(Debug)]
pub enum ManagedHandle {
    Interval(Ticker),
    Process(ProcessHandle),
}

impl ManagedHandle {
    pub fn id(&self) -> HandleId {
        match self {
            ManagedHandle::Interval(ticker) => ticker.id(),
            ManagedHandle::Process(process) => process.id,
        }
    }
}

/// Options for [`ProcessManager::run_process`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Log and swallow transient dependency resolution failures.
    pub ignore_transient_resolution_errors: bool,
}

impl RunOptions {
    pub fn tolerant() -> Self {
        Self {
            ignore_transient_resolution_errors: true,
        }
    }
}

#[derive(Default)]
struct CallbackState {
    terminated: bool,
    pending: Vec<TerminationCallback>,
}

struct Inner {
    token: CancellationToken,
    transient_markers: Vec<String>,
    handles: Mutex<BTreeMap<HandleId, ManagedHandle>>,
    callbacks: Mutex<CallbackState>,
    exit: watch::Sender<Option<i32>>,
}

/// Lifecycle manager for one run. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ProcessManager {
    inner: Arc<Inner>,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ProcessManager {
    pub fn new() -> Self {
        Self::with_transient_markers(DEFAULT_TRANSIENT_MARKERS.iter().map(|m| m.to_string()))
    }

    /// Manager that treats command failures whose stderr contains any of
    /// `markers` as transient dependency resolution errors.
    pub fn with_transient_markers<I>(markers: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let (exit, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                transient_markers: markers.into_iter().collect(),
                handles: Mutex::new(BTreeMap::new()),
                callbacks: Mutex::new(CallbackState::default()),
                exit,
            }),
        }
    }

    /// The run's cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    pub fn is_terminated(&self) -> bool {
        lock(&self.inner.callbacks).terminated
    }

    /// Number of registered handles still owned by the manager.
    pub fn active_handles(&self) -> usize {
        lock(&self.inner.handles).len()
    }

    /// Register a ticker. Registering the same ticker twice keeps a single
    /// entry, so it is cleaned up once.
    pub fn register_interval(&self, ticker: Ticker) -> HandleId {
        let id = ticker.id();
        if self.is_terminated() {
            ticker.stop();
            return id;
        }
        debug!(handle_id = id, "Registered interval");
        lock(&self.inner.handles).insert(id, ManagedHandle::Interval(ticker));
        id
    }

    /// Start a ticker and register it.
    pub fn start_ticker<F>(&self, period: Duration, on_tick: F) -> Ticker
    where
        F: FnMut() + Send + 'static,
    {
        let ticker = Ticker::spawn(period, on_tick);
        self.register_interval(ticker.clone());
        ticker
    }

    /// Stop a registered handle and drop it from the registry.
    ///
    /// Returns `false` if the handle was not registered (already cleared,
    /// exited, or never registered).
    pub fn clear(&self, id: HandleId) -> bool {
        let handle = lock(&self.inner.handles).remove(&id);
        match handle {
            Some(ManagedHandle::Interval(ticker)) => {
                ticker.stop();
                true
            }
            Some(ManagedHandle::Process(process)) => {
                process.stop.cancel();
                true
            }
            None => false,
        }
    }

    /// Take ownership of a spawned child.
    ///
    /// The child is stopped on termination. If it exits on its own first, the
    /// run terminates: `Completed` on a zero exit, `Interrupted` when it died
    /// of SIGINT (or exited 130), `Fatal` otherwise.
    pub fn register_process(&self, child: Child, label: impl Into<String>) -> HandleId {
        let id = next_handle_id();
        let label = label.into();
        let pid = child.id();

        if self.is_terminated() {
            let mut child = child;
            let _ = child.start_kill();
            return id;
        }

        let stop = CancellationToken::new();
        let mut handles = lock(&self.inner.handles);
        let watcher = tokio::spawn(watch_process(self.clone(), id, label.clone(), child, stop.clone()));
        handles.insert(
            id,
            ManagedHandle::Process(ProcessHandle {
                id,
                label: label.clone(),
                pid,
                stop,
                watcher: Some(watcher),
            }),
        );
        drop(handles);

        info!(handle_id = id, label = %label, pid = ?pid, "Registered process");
        id
    }

    /// Register a callback to run exactly once when the run terminates.
    ///
    /// Registering after termination runs the callback immediately.
    pub async fn on_terminated<F, Fut>(&self, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let boxed: TerminationCallback = Box::new(move || callback().boxed());
        let late = {
            let mut state = lock(&self.inner.callbacks);
            if state.terminated {
                Some(boxed)
            } else {
                state.pending.push(boxed);
                None
            }
        };
        if let Some(callback) = late {
            debug!("Run already terminated, running callback immediately");
            run_callback(0, callback).await;
        }
    }

    /// Run `work`, classifying its failure.
    ///
    /// - success yields `Some(value)`;
    /// - cancellation is returned unchanged;
    /// - a transient dependency resolution failure is logged and yields
    ///   `None` when tolerated, otherwise it becomes
    ///   [`ProcessError::TransientResolution`];
    /// - anything else is returned as [`ProcessError::Fatal`].
    pub async fn run_process<T, F, Fut>(&self, options: RunOptions, work: F) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match work().await {
            Ok(value) => Ok(Some(value)),
            Err(ProcessError::Cancelled) => Err(ProcessError::Cancelled),
            Err(err) if self.is_transient(&err) => {
                if options.ignore_transient_resolution_errors {
                    warn!(error = %err, "Ignoring transient dependency resolution error");
                    return Ok(None);
                }
                Err(match err {
                    ProcessError::Command {
                        command, stderr, ..
                    } => ProcessError::TransientResolution {
                        command,
                        detail: stderr,
                    },
                    other => other,
                })
            }
            Err(err @ ProcessError::Fatal(_)) => Err(err),
            Err(err) => Err(ProcessError::Fatal(Box::new(err))),
        }
    }

    fn is_transient(&self, err: &ProcessError) -> bool {
        match err {
            ProcessError::TransientResolution { .. } => true,
            ProcessError::Command { stderr, .. } => self
                .inner
                .transient_markers
                .iter()
                .any(|marker| stderr.contains(marker.as_str())),
            _ => false,
        }
    }

    /// Terminate the run.
    ///
    /// Only the first call does anything; it returns the exit code. Later
    /// calls return `None` immediately.
    pub async fn terminate(&self, reason: TerminationReason) -> Option<i32> {
        let callbacks = {
            let mut state = lock(&self.inner.callbacks);
            if state.terminated {
                debug!(?reason, "Termination already triggered");
                return None;
            }
            state.terminated = true;
            std::mem::take(&mut state.pending)
        };

        info!(?reason, "Terminating run");
        self.inner.token.cancel();

        let handles: Vec<ManagedHandle> = {
            let mut registry = lock(&self.inner.handles);
            std::mem::take(&mut *registry).into_values().collect()
        };

        let mut processes = Vec::new();
        for handle in handles {
            match handle {
                ManagedHandle::Interval(ticker) => {
                    debug!(handle_id = ticker.id(), "Clearing interval");
                    ticker.stop();
                }
                ManagedHandle::Process(process) => processes.push(process),
            }
        }

        for mut process in processes {
            debug!(handle_id = process.id, label = %process.label, "Stopping process");
            process.stop.cancel();
            if let Some(watcher) = process.watcher.take() {
                let _ = watcher.await;
            }
        }

        for (index, callback) in callbacks.into_iter().enumerate() {
            run_callback(index, callback).await;
        }

        let code = reason.exit_code();
        self.inner.exit.send_replace(Some(code));
        Some(code)
    }

    /// Trigger termination, or wait for the one already in flight, and return
    /// the exit code. Must not be called from inside a termination callback.
    pub async fn finish(&self, reason: TerminationReason) -> i32 {
        match self.terminate(reason).await {
            Some(code) => code,
            None => self.wait_for_exit().await,
        }
    }

    /// Wait until termination has completed and return its exit code.
    pub async fn wait_for_exit(&self) -> i32 {
        let mut rx = self.inner.exit.subscribe();
        let code = match rx.wait_for(Option::is_some).await {
            Ok(code) => (*code).unwrap_or(TerminationReason::Fatal.exit_code()),
            Err(_) => TerminationReason::Fatal.exit_code(),
        };
        code
    }

    /// Listen for Ctrl-C and terminate with [`TerminationReason::Interrupted`]
    /// on the first one. The listener exits once the run has terminated.
    ///
    /// If the run ends some other way, the listener stays up for a short grace
    /// period so a Ctrl-C racing with that ending is consumed here.
    pub fn install_interrupt_handler(&self) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let token = manager.token();
            let interrupt = tokio::signal::ctrl_c();
            tokio::pin!(interrupt);
            tokio::select! {
                _ = token.cancelled() => {
                    if let Ok(Ok(())) = tokio::time::timeout(INTERRUPT_GRACE, &mut interrupt).await {
                        debug!("Interrupt received after termination");
                    }
                }
                signal = &mut interrupt => match signal {
                    Ok(()) => {
                        info!("Interrupt received");
                        manager.terminate(TerminationReason::Interrupted).await;
                    }
                    Err(err) => warn!(error = %err, "Failed to listen for interrupt"),
                },
            }
        })
    }

    fn deregister(&self, id: HandleId) {
        lock(&self.inner.handles).remove(&id);
    }
}

async fn run_callback(index: usize, callback: TerminationCallback) {
    match AssertUnwindSafe(callback()).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(index, error = %err, "Termination callback failed"),
        Err(_) => warn!(index, "Termination callback panicked"),
    }
}

async fn watch_process(
    manager: ProcessManager,
    id: HandleId,
    label: String,
    mut child: Child,
    stop: CancellationToken,
) {
    let waited = tokio::select! {
        biased;
        _ = stop.cancelled() => None,
        status = child.wait() => Some(status),
    };

    let status = match waited {
        Some(status) => status,
        None => {
            if let Err(err) = child.kill().await {
                debug!(handle_id = id, label = %label, error = %err, "Process already gone");
            }
            return;
        }
    };

    manager.deregister(id);
    let reason = match status {
        Ok(status) => {
            let reason = exit_reason(&status);
            match reason {
                TerminationReason::Completed => {
                    info!(handle_id = id, label = %label, "Process exited")
                }
                TerminationReason::Interrupted => {
                    info!(handle_id = id, label = %label, "Process interrupted")
                }
                TerminationReason::Fatal => warn!(
                    handle_id = id,
                    label = %label,
                    code = ?status.code(),
                    "Process exited with failure"
                ),
            }
            reason
        }
        Err(err) => {
            warn!(handle_id = id, label = %label, error = %err, "Failed to wait for process");
            TerminationReason::Fatal
        }
    };
    manager.terminate(reason).await;
}

#[cfg(unix)]
const SIGINT: i32 = 2;

/// Map a registered process's exit status to the reason the run ends.
///
/// A terminal Ctrl-C reaches the whole foreground process group, so the child
/// often dies of SIGINT before the interrupt listener runs. That exit, and the
/// shell convention of status 130, count as an interrupt.
pub(crate) fn exit_reason(status: &ExitStatus) -> TerminationReason {
    if status.success() {
        return TerminationReason::Completed;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if status.signal() == Some(SIGINT) {
            return TerminationReason::Interrupted;
        }
    }
    if status.code() == Some(TerminationReason::Interrupted.exit_code()) {
        return TerminationReason::Interrupted;
    }
    TerminationReason::Fatal
}
