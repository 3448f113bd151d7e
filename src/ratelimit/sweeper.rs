//! Background eviction of stale rate limit windows.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::limiter::RateLimiter;

/// Periodically evict windows that ended more than `grace_ms` ago.
///
/// The task runs until the returned handle is aborted.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, interval: Duration, grace_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let evicted = limiter.sweep(grace_ms);
            if evicted > 0 {
                debug!(evicted, remaining = limiter.key_count(), "Swept stale rate limit windows");
            }
        }
    })
}
