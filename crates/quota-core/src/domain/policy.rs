//! Quota policy for a limiter instance.

use std::time::Duration;

use crate::ports::RateLimitError;

/// Maximum admitted units per window.
///
/// `partition_by_user` is only a hint for the HTTP layer's default key
/// strategy; the limiter itself never reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub limit: u64,
    pub window: Duration,
    pub partition_by_user: bool,
}

impl Policy {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window,
            partition_by_user: false,
        }
    }

    pub fn per_user(mut self, enabled: bool) -> Self {
        self.partition_by_user = enabled;
        self
    }

    /// Reject windows the storage cannot align: anything under 1ms, or too
    /// wide to express as signed milliseconds.
    ///
    /// A zero limit is valid and means every request is denied.
    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.window.as_millis() == 0 {
            return Err(RateLimitError::Config(format!(
                "window must be at least 1ms, got {:?}",
                self.window
            )));
        }
        if i64::try_from(self.window.as_millis()).is_err()
            || chrono::Duration::from_std(self.window).is_err()
        {
            return Err(RateLimitError::Config(format!(
                "window {:?} is too large",
                self.window
            )));
        }
        Ok(())
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(60))
    }
}
