//! Admission decisions over a pluggable storage.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{Policy, WindowState, window_start_for};
use crate::ports::{Clock, RateLimitError, RateLimitResult, RateLimitStorage, SystemClock};

/// Fixed-window rate limiter.
///
/// Holds nothing but its policy and collaborators; every count lives in the
/// storage. Every call is accounted, including the ones that end up denied.
pub struct Limiter {
    storage: Arc<dyn RateLimitStorage>,
    policy: Policy,
    clock: Arc<dyn Clock>,
    storage_timeout: Option<Duration>,
    endpoint_limits: HashMap<String, u64>,
}

impl Limiter {
    /// Create a limiter, failing fast on an invalid policy.
    pub fn new(storage: Arc<dyn RateLimitStorage>, policy: Policy) -> Result<Self, RateLimitError> {
        policy.validate()?;

        Ok(Self {
            storage,
            policy,
            clock: Arc::new(SystemClock),
            storage_timeout: None,
            endpoint_limits: HashMap::new(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bound every storage call. A call that runs past the deadline is
    /// dropped and surfaces as [`RateLimitError::Timeout`].
    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = Some(timeout);
        self
    }

    /// Per-path overrides of the policy limit, matched exactly.
    pub fn with_endpoint_limits(mut self, limits: HashMap<String, u64>) -> Self {
        self.endpoint_limits = limits;
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn has_endpoint_limits(&self) -> bool {
        !self.endpoint_limits.is_empty()
    }

    /// Account one unit for `key` and decide.
    pub async fn allow(&self, key: &str) -> Result<RateLimitResult, RateLimitError> {
        self.allow_n(key, 1).await
    }

    /// Account `hits` units for `key` against the policy limit.
    pub async fn allow_n(&self, key: &str, hits: u64) -> Result<RateLimitResult, RateLimitError> {
        self.check(key, hits, self.policy.limit).await
    }

    /// Account one unit for `key` against an explicit limit.
    pub async fn allow_with_limit(
        &self,
        key: &str,
        limit: u64,
    ) -> Result<RateLimitResult, RateLimitError> {
        self.check(key, 1, limit).await
    }

    /// Account one unit for `key` against the limit configured for `endpoint`.
    pub async fn allow_for_endpoint(
        &self,
        key: &str,
        endpoint: &str,
    ) -> Result<RateLimitResult, RateLimitError> {
        self.check(key, 1, self.limit_for_endpoint(endpoint)).await
    }

    /// Decision the next unit would get, without accounting anything.
    pub async fn peek(&self, key: &str) -> Result<RateLimitResult, RateLimitError> {
        self.peek_with_limit(key, self.policy.limit).await
    }

    /// [`Limiter::peek`] against the limit that applies to `endpoint`.
    pub async fn peek_for_endpoint(
        &self,
        key: &str,
        endpoint: &str,
    ) -> Result<RateLimitResult, RateLimitError> {
        self.peek_with_limit(key, self.limit_for_endpoint(endpoint)).await
    }

    async fn peek_with_limit(&self, key: &str, limit: u64) -> Result<RateLimitResult, RateLimitError> {
        let now = self.clock.now();
        let window = self.policy.window;
        let state = self
            .bounded(self.storage.get(key, window, now))
            .await?
            .unwrap_or_else(|| WindowState::new(window_start_for(now, window), window));

        let probe = WindowState {
            count: state.count + 1,
            ..state
        };
        let mut result = RateLimitResult::from_state(&probe, limit, now);
        result.remaining = limit.saturating_sub(state.count);
        Ok(result)
    }

    /// Clear the window for `key`.
    pub async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        self.bounded(self.storage.reset(key)).await
    }

    pub fn limit_for_endpoint(&self, endpoint: &str) -> u64 {
        self.endpoint_override(endpoint).unwrap_or(self.policy.limit)
    }

    /// The override configured for exactly `endpoint`, if any.
    pub fn endpoint_override(&self, endpoint: &str) -> Option<u64> {
        self.endpoint_limits.get(endpoint).copied()
    }

    /// Compose a partition key such as `user:alice`.
    pub fn build_key(kind: &str, id: &str) -> String {
        format!("{kind}:{id}")
    }

    /// Scope `key` to one route, e.g. `ip:1.2.3.4:endpoint:/api/heavy`.
    pub fn endpoint_key(key: &str, endpoint: &str) -> String {
        format!("{key}:endpoint:{endpoint}")
    }

    async fn check(
        &self,
        key: &str,
        hits: u64,
        limit: u64,
    ) -> Result<RateLimitResult, RateLimitError> {
        if hits == 0 {
            return Err(RateLimitError::Config("hits must be at least 1".to_string()));
        }

        let now = self.clock.now();
        let state = self
            .bounded(self.storage.increment(key, hits, self.policy.window, now))
            .await?;

        let result = RateLimitResult::from_state(&state, limit, now);
        tracing::trace!(
            key = %key,
            count = state.count,
            limit,
            allowed = result.allowed,
            "Rate limit evaluated"
        );
        Ok(result)
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, RateLimitError>>,
    ) -> Result<T, RateLimitError> {
        match self.storage_timeout {
            Some(timeout) => tokio::time::timeout(timeout, fut)
                .await
                .map_err(|_| RateLimitError::Timeout(timeout))?,
            None => fut.await,
        }
    }
}
