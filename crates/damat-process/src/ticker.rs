//! Recurring UI refresh owned by the lifecycle manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Identifier of a handle registered with the lifecycle manager.
pub type HandleId = u64;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_handle_id() -> HandleId {
    NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed)
}

struct TickerState {
    active: bool,
    task: Option<JoinHandle<()>>,
}

/// A recurring timer that invokes a callback every `period`.
///
/// Clones share the same timer. Once [`Ticker::stop`] returns, the callback
/// never runs again.
#[derive(Clone)]
pub struct Ticker {
    id: HandleId,
    state: Arc<Mutex<TickerState>>,
}

impl std::fmt::Debug for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticker")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Ticker {
    /// Start a ticker. The first tick fires after one full period.
    pub fn spawn<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let state = Arc::new(Mutex::new(TickerState {
            active: true,
            task: None,
        }));

        let shared = state.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                // The lock is held across the callback so `stop` cannot
                // return while a tick is in flight.
                let ticked = match shared.lock() {
                    Ok(guard) if guard.active => {
                        on_tick();
                        true
                    }
                    _ => false,
                };
                if !ticked {
                    return;
                }
            }
        });

        if let Ok(mut guard) = state.lock() {
            guard.task = Some(task);
        }

        Self {
            id: next_handle_id(),
            state,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().map(|s| s.active).unwrap_or(false)
    }

    /// Stop the ticker. Idempotent.
    pub fn stop(&self) {
        let task = match self.state.lock() {
            Ok(mut guard) => {
                guard.active = false;
                guard.task.take()
            }
            Err(poisoned) => {
                let mut guard = poisoned.into_inner();
                guard.active = false;
                guard.task.take()
            }
        };
        if let Some(task) = task {
            task.abort();
        }
    }
}
