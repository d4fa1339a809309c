//! Background sweeping of expired rate limit entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::limiter::RateLimiter;

/// Handle to a running sweeper task.
///
/// Dropping the handle also stops the task, at its next wakeup.
pub struct SweeperHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(self) {
        let SweeperHandle { stop, task } = self;
        let _ = stop.send(());
        if let Err(e) = task.await {
            warn!(error = %e, "Sweeper task ended abnormally");
        }
    }
}

/// Spawn a task that sweeps expired entries from `limiter` every `every`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, every: Duration) -> SweeperHandle {
    let every = every.max(Duration::from_millis(1));
    let (stop, mut stop_rx) = oneshot::channel();

    info!(interval_ms = every.as_millis() as u64, "Starting rate limit sweeper");

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    let swept = limiter.sweep_expired();
                    if swept > 0 {
                        debug!(swept = swept, tracked = limiter.len(), "Swept expired entries");
                    }
                }
            }
        }

        debug!("Rate limit sweeper stopped");
    });

    SweeperHandle { stop, task }
}
