//! Core rate limiter implementation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::window::{Admission, Quota, RateWindow};
use crate::error::Result;

/// A fixed-window rate limiter keyed by opaque strings.
///
/// The table of windows is process-wide and shared between callers. Each
/// decision runs under the write lock of the key's shard, so concurrent
/// callers on the same key never both admit from a stale count.
#[derive(Debug)]
pub struct RateLimiter {
    /// Counting windows indexed by key
    windows: DashMap<String, RateWindow>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a new rate limiter reading the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a new rate limiter reading the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            clock,
        }
    }

    /// Decide whether a call for `key` is admitted under `limit` calls per
    /// `window_ms` milliseconds.
    ///
    /// Returns a configuration error if either bound is zero.
    pub fn try_admit(&self, key: &str, limit: u64, window_ms: u64) -> Result<bool> {
        let quota = Quota::new(limit, window_ms)?;
        Ok(self.admit(key, &quota).admitted)
    }

    /// Decide whether a call for `key` is admitted under `quota`.
    pub fn admit(&self, key: &str, quota: &Quota) -> Admission {
        let now = self.clock.now_millis();

        trace!(key = %key, limit = quota.limit(), window_ms = quota.window_ms(), "Checking rate limit");

        let admission = match self.windows.entry(key.to_owned()) {
            Entry::Vacant(slot) => {
                let window = RateWindow::open(now, quota.window_ms());
                debug!(key = %key, reset_time = window.reset_time, "Opening rate limit window");
                slot.insert(window);
                Admission::admitted(&window, quota)
            }
            Entry::Occupied(mut slot) => {
                let window = slot.get_mut();
                if window.is_expired(now) {
                    *window = RateWindow::open(now, quota.window_ms());
                    trace!(key = %key, reset_time = window.reset_time, "Rate limit window rolled over");
                    Admission::admitted(window, quota)
                } else if window.count >= quota.limit() {
                    Admission::rejected(window, quota, now)
                } else {
                    window.count += 1;
                    Admission::admitted(window, quota)
                }
            }
        };

        if !admission.admitted {
            debug!(
                key = %key,
                limit = quota.limit(),
                retry_after_ms = admission.retry_after_ms,
                "Rate limit exceeded"
            );
        }

        admission
    }

    /// Forget the window for `key`, so its next call is a first use.
    ///
    /// Returns `true` if a window was recorded.
    pub fn reset(&self, key: &str) -> bool {
        self.windows.remove(key).is_some()
    }

    /// Get a snapshot of the window recorded for `key`.
    pub fn window(&self, key: &str) -> Option<RateWindow> {
        self.windows.get(key).map(|w| *w)
    }

    /// Evict windows that ended more than `grace_ms` milliseconds ago.
    ///
    /// Returns the number of evicted windows.
    pub fn sweep(&self, grace_ms: u64) -> usize {
        let now = self.clock.now_millis();
        let mut evicted = 0;
        self.windows.retain(|_, window| {
            let live = window.reset_time.saturating_add(grace_ms) >= now;
            if !live {
                evicted += 1;
            }
            live
        });
        evicted
    }

    /// Clear all windows.
    pub fn clear(&self) {
        self.windows.clear();
    }

    /// Get the number of keys with a recorded window.
    pub fn key_count(&self) -> usize {
        self.windows.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
