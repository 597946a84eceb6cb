//! Background task that periodically sweeps stale rate limit state.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::limiter::RateLimiter;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Handle to a running sweep task.
///
/// Dropping the handle without calling [`Sweeper::shutdown`] also stops the
/// task at its next wake-up, since the shutdown channel closes.
pub struct Sweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn a sweep loop on the current tokio runtime.
    ///
    /// The first sweep runs one full `interval` after spawning.
    pub fn spawn(limiter: Arc<RateLimiter>, interval: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);

        info!(interval_secs = interval.as_secs_f64(), "Starting rate limit sweeper");

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = limiter.cleanup();
                        if report.evicted > 0 {
                            debug!(evicted = report.evicted, remaining = limiter.key_count(), "Evicted stale rate limit keys");
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("Rate limit sweeper stopped");
        });

        Self { shutdown, handle }
    }

    /// Stop the sweep loop and wait for it to exit.
    pub async fn shutdown(self) {
        info!("Stopping rate limit sweeper");
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Rate limit sweeper task failed");
        }
    }
}
