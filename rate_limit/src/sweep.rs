use crate::limiter::RateLimiter;
use log::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Delay before the first sweep.
pub const DEFAULT_SWEEP_DELAY: Duration = Duration::from_secs(30 * 60);
/// Period between sweeps after the first one.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Owns the background sweep task. Dropping the handle stops the task.
#[derive(Debug)]
pub struct SweepHandle {
    task: JoinHandle<()>,
}

impl SweepHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl RateLimiter {
    /// Spawns a task that calls `sweep_expired` after `initial_delay` and then
    /// every `period`. The task only holds a weak reference and exits once the
    /// limiter has been dropped. Must be called from within a tokio runtime.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        initial_delay: Duration,
        period: Duration,
    ) -> SweepHandle {
        let limiter = Arc::downgrade(self);
        info!(
            "Starting rate limit sweeper (first run in {}s, then every {}s)",
            initial_delay.as_secs(),
            period.as_secs()
        );

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + initial_delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    debug!("Rate limiter dropped, stopping sweeper");
                    break;
                };
                limiter.sweep_expired();
            }
        });

        SweepHandle { task }
    }
}
