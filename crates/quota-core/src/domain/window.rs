//! Per-key fixed-window state.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Counter for one key inside one aligned window.
///
/// Owned by storage. A new value replaces the old one when the window rolls
/// over; it is never carried forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Units consumed in the current window.
    pub count: u64,
    /// Instant the current window began, aligned to the Unix epoch.
    pub window_start: DateTime<Utc>,
    /// Window length this state was accounted against.
    pub window: Duration,
}

impl WindowState {
    pub fn new(window_start: DateTime<Utc>, window: Duration) -> Self {
        Self {
            count: 0,
            window_start,
            window,
        }
    }

    /// Instant at which this window ends and the next one begins.
    pub fn reset_at(&self) -> DateTime<Utc> {
        self.window_start
            .checked_add_signed(chrono_window(self.window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether `now` still falls inside this window.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.window_start == window_start_for(now, self.window)
    }

    /// Whether the state has been idle long enough to be reclaimed.
    ///
    /// True once `now - window_start` exceeds `window * retention_factor`.
    pub fn is_stale(&self, now: DateTime<Utc>, retention_factor: u32) -> bool {
        let retention = chrono_window(self.window)
            .checked_mul(retention_factor.max(1) as i32)
            .unwrap_or(chrono::Duration::MAX);
        now - self.window_start > retention
    }
}

/// Greatest epoch-aligned multiple of `window` that is `<= now`.
///
/// Millisecond resolution; callers reject windows shorter than 1ms or wider
/// than `i64::MAX` milliseconds before reaching this point.
pub fn window_start_for(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX).max(1);
    let now_ms = now.timestamp_millis();
    let start_ms = now_ms - now_ms.rem_euclid(window_ms);
    DateTime::from_timestamp_millis(start_ms).unwrap_or(now)
}

fn chrono_window(window: Duration) -> chrono::Duration {
    chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX)
}
