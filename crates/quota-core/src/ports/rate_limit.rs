//! Rate limiting port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::domain::WindowState;

/// Storage trait - abstraction over quota ledgers (in-memory, Redis).
///
/// Implementations must make the rollover-and-increment for one key a single
/// atomic step and must never serialize unrelated keys behind one lock.
#[async_trait]
pub trait RateLimitStorage: Send + Sync {
    /// Account `hits` units for `key` in the window containing `now`.
    ///
    /// Rolls the key over to a fresh window first if its stored window has
    /// elapsed. Returns the post-increment state.
    async fn increment(
        &self,
        key: &str,
        hits: u64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowState, RateLimitError>;

    /// Read the state for `key` without accounting.
    /// Returns `None` if the key is unknown or its window has elapsed.
    async fn get(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<WindowState>, RateLimitError>;

    /// Forget `key` so its next increment starts a fresh window.
    async fn reset(&self, key: &str) -> Result<(), RateLimitError>;

    /// Stop background maintenance and release resources. Idempotent.
    async fn close(&self) -> Result<(), RateLimitError>;
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    /// The policy limit, echoed for clients.
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
    /// Zero when allowed.
    pub retry_after: Duration,
}

impl RateLimitResult {
    /// Build the decision implied by a post-increment window state.
    pub fn from_state(state: &WindowState, limit: u64, now: DateTime<Utc>) -> Self {
        let allowed = limit > 0 && state.count <= limit;
        let reset_at = state.reset_at();
        let retry_after = if allowed {
            Duration::ZERO
        } else {
            (reset_at - now).to_std().unwrap_or(Duration::ZERO)
        };

        Self {
            allowed,
            limit,
            remaining: limit.saturating_sub(state.count),
            reset_at,
            retry_after,
        }
    }

    /// `Retry-After` value in whole seconds, rounded up so clients never
    /// retry before the window resets.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

/// Rate limit errors.
///
/// Denials are not errors; they are an `allowed == false` result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("Invalid rate limit configuration: {0}")]
    Config(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend call exceeded its deadline of {0:?}")]
    Timeout(Duration),

    #[error("Storage has been closed")]
    Closed,
}
