//! Periodic tick driver.
//!
//! Hosts without their own scheduler can hand a grid to [`TickDriver`], which
//! calls [`Tickable::on_update_tick`] on a fixed interval from a tokio task
//! until shut down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Something driven by a periodic tick. Implementations must not fail or
/// block; they run unattended.
pub trait Tickable: Send + Sync + 'static {
    /// Run one tick.
    fn on_update_tick(&self);
}

/// Handle to a running tick task.
pub struct TickDriver {
    shutdown: Arc<Notify>,
    handle: JoinHandle<u64>,
}

impl TickDriver {
    /// Spawn a task ticking `target` every `interval` on the current runtime.
    ///
    /// The first tick fires immediately. Ticks missed while the runtime was
    /// busy are skipped rather than replayed.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime, or if `interval` is zero.
    #[must_use]
    pub fn spawn<T: Tickable>(target: Arc<T>, interval: Duration) -> Self {
        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut ticks: u64 = 0;
            tracing::debug!(?interval, "tick driver started");
            loop {
                tokio::select! {
                    () = signal.notified() => break,
                    _ = ticker.tick() => {
                        target.on_update_tick();
                        ticks += 1;
                    }
                }
            }
            tracing::debug!(ticks, "tick driver stopped");
            ticks
        });

        Self { shutdown, handle }
    }

    /// Stop the task and wait for it. Returns the number of ticks run.
    pub async fn shutdown(self) -> u64 {
        self.shutdown.notify_one();
        match self.handle.await {
            Ok(ticks) => ticks,
            Err(e) => {
                tracing::warn!(error = %e, "tick task failed during shutdown");
                0
            }
        }
    }
}
