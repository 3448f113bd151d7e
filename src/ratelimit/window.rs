//! Fixed-window state and quota types.

use serde::Serialize;
use std::time::Duration;

use crate::error::{Result, TurnstileError};

/// A validated quota: at most `limit` admissions per `window_ms` milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quota {
    limit: u64,
    window_ms: u64,
}

impl Quota {
    /// Create a quota, rejecting a zero limit or a zero-length window.
    pub fn new(limit: u64, window_ms: u64) -> Result<Self> {
        if limit == 0 {
            return Err(TurnstileError::Config(
                "rate limit must be greater than zero".to_string(),
            ));
        }
        if window_ms == 0 {
            return Err(TurnstileError::Config(
                "rate limit window must be greater than zero".to_string(),
            ));
        }
        Ok(Self { limit, window_ms })
    }

    /// Create a quota from a window expressed as a `Duration`.
    pub fn per(limit: u64, window: Duration) -> Result<Self> {
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        Self::new(limit, window_ms)
    }

    /// Maximum admissions per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }
}

/// The counting window recorded for a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Admissions observed in this window
    pub count: u64,
    /// Epoch milliseconds at which this window ends
    pub reset_time: u64,
}

impl RateWindow {
    /// Open a window at `now` with its first admission already counted.
    pub fn open(now: u64, window_ms: u64) -> Self {
        Self {
            count: 1,
            reset_time: now.saturating_add(window_ms),
        }
    }

    /// A window is expired strictly after its reset time.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.reset_time
    }

    /// Quota left in this window for the given limit.
    pub fn remaining(&self, limit: u64) -> u64 {
        limit.saturating_sub(self.count)
    }

    /// Milliseconds until this window resets.
    pub fn duration_until_reset(&self, now: u64) -> u64 {
        self.reset_time.saturating_sub(now)
    }
}

/// The outcome of a single admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub admitted: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at_ms: u64,
    /// Zero when admitted
    pub retry_after_ms: u64,
}

impl Admission {
    pub(crate) fn admitted(window: &RateWindow, quota: &Quota) -> Self {
        Self {
            admitted: true,
            limit: quota.limit(),
            remaining: window.remaining(quota.limit()),
            reset_at_ms: window.reset_time,
            retry_after_ms: 0,
        }
    }

    pub(crate) fn rejected(window: &RateWindow, quota: &Quota, now: u64) -> Self {
        Self {
            admitted: false,
            limit: quota.limit(),
            remaining: 0,
            reset_at_ms: window.reset_time,
            // The old window is still live at reset_time, so the earliest
            // admission is one millisecond later.
            retry_after_ms: window.duration_until_reset(now).saturating_add(1),
        }
    }

    /// Whole seconds to advertise in a `Retry-After` header, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after_ms.div_ceil(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_rejects_zero_limit() {
        let err = Quota::new(0, 1000).unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
    }

    #[test]
    fn test_quota_rejects_zero_window() {
        let err = Quota::new(5, 0).unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
        assert!(Quota::per(5, Duration::ZERO).is_err());
    }

    #[test]
    fn test_quota_from_duration() {
        let quota = Quota::per(10, Duration::from_secs(60)).unwrap();
        assert_eq!(quota.limit(), 10);
        assert_eq!(quota.window_ms(), 60_000);
    }

    #[test]
    fn test_window_open_counts_first_admission() {
        let window = RateWindow::open(500, 1000);
        assert_eq!(window.count, 1);
        assert_eq!(window.reset_time, 1500);
        assert_eq!(window.remaining(3), 2);
    }

    #[test]
    fn test_window_expiry_is_strict() {
        let window = RateWindow::open(0, 1000);
        assert!(!window.is_expired(999));
        assert!(!window.is_expired(1000));
        assert!(window.is_expired(1001));
    }

    #[test]
    fn test_rejection_retry_after() {
        let quota = Quota::new(1, 1000).unwrap();
        let window = RateWindow::open(0, 1000);

        let admission = Admission::rejected(&window, &quota, 250);
        assert!(!admission.admitted);
        assert_eq!(admission.remaining, 0);
        assert_eq!(admission.retry_after_ms, 751);
        assert_eq!(admission.retry_after_secs(), 1);
    }
}
