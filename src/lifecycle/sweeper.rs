//! Periodic background sweeps with deterministic stop.

use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::lifecycle::Shutdown;

/// Handle to a running sweep task.
///
/// The task only holds a [`Weak`] reference to its owner, so dropping the
/// owner ends the loop at the next tick even if `stop` is never called.
pub struct Sweeper {
    name: &'static str,
    shutdown: Shutdown,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn `sweep` every `interval` against `owner` until stopped.
    ///
    /// The first sweep runs one full interval after spawning.
    pub fn spawn<T, F, Fut>(name: &'static str, owner: &Arc<T>, interval: Duration, sweep: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let shutdown = Shutdown::new();
        let mut stop_rx = shutdown.subscribe();
        let owner: Weak<T> = Arc::downgrade(owner);

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            tracing::debug!(task = name, interval = ?interval, "Sweep task started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(owner) = owner.upgrade() else {
                            break;
                        };
                        sweep(owner).await;
                    }
                    _ = stop_rx.recv() => {
                        break;
                    }
                }
            }

            tracing::debug!(task = name, "Sweep task exited");
        });

        Self {
            name,
            shutdown,
            handle,
        }
    }

    /// Whether the task has already exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the task and wait until it has exited.
    ///
    /// A sweep that does not finish within `grace` is aborted, and the
    /// call still returns only once the task is gone. Returns `true` when
    /// the task exited on its own.
    pub async fn stop(mut self, grace: Duration) -> bool {
        self.shutdown.trigger();

        match time::timeout(grace, &mut self.handle).await {
            Ok(_) => {
                tracing::debug!(task = self.name, "Sweep task stopped");
                true
            }
            Err(_) => {
                tracing::warn!(task = self.name, grace = ?grace, "Sweep task did not stop in time, aborting");
                self.handle.abort();
                let _ = (&mut self.handle).await;
                false
            }
        }
    }
}

/// Holder for a component's single sweep task.
#[derive(Default)]
pub struct SweeperSlot {
    inner: Mutex<Option<Sweeper>>,
}

impl SweeperSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn via `spawn` unless a sweep is already running.
    pub fn start_with(&self, spawn: impl FnOnce() -> Sweeper) {
        let mut slot = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_none() {
            *slot = Some(spawn());
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|s| !s.is_finished())
    }

    /// Stop the running sweep, if any, and wait for it to exit.
    pub async fn stop(&self, grace: Duration) {
        let sweeper = self.inner.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(sweeper) = sweeper {
            sweeper.stop(grace).await;
        }
    }
}
