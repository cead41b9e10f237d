//! Redis storage implementation using a fixed window per hash key.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use quota_core::domain::{WindowState, window_start_for};
use quota_core::ports::{RateLimitError, RateLimitStorage};

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whether to fallback to in-memory storage if Redis is unavailable
    pub fallback_to_memory: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            fallback_to_memory: true,
        }
    }
}

/// Redis storage configuration.
#[derive(Debug, Clone)]
pub struct RedisStorageConfig {
    /// Redis connection config
    pub redis: RedisConfig,
    /// Key prefix for rate limit keys
    pub key_prefix: String,
    /// Keys expire `window * retention_factor` after their window starts
    pub retention_factor: u32,
}

impl Default for RedisStorageConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            key_prefix: "ratelimit".to_string(),
            retention_factor: 2,
        }
    }
}

/// Redis-backed storage shared by every instance pointing at the same server.
///
/// Each key is a hash holding `start`, `window` and `count`. Rollover and
/// increment run in one Lua script, so the server serializes racing callers.
/// Expiry is delegated to Redis, so there is no sweeper to run.
pub struct RedisStorage {
    conn: ConnectionManager,
    config: RedisStorageConfig,
    /// Lua script for atomic rollover + increment with expiry
    script: Script,
    closed: AtomicBool,
}

impl RedisStorage {
    pub async fn new(config: RedisStorageConfig) -> Result<Self, RateLimitError> {
        let client = Client::open(config.redis.url.as_str())
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.redis.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| RateLimitError::Backend("Connection timed out".to_string()))?
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        // Returns the post-increment count
        let script = Script::new(
            r#"
            local key = KEYS[1]
            local hits = tonumber(ARGV[1])
            local start = ARGV[2]
            local window = ARGV[3]
            local ttl_ms = tonumber(ARGV[4])

            local stored = redis.call('HMGET', key, 'start', 'window')
            if stored[1] ~= start or stored[2] ~= window then
                redis.call('HSET', key, 'start', start, 'window', window, 'count', 0)
                redis.call('PEXPIRE', key, ttl_ms)
            end

            return redis.call('HINCRBY', key, 'count', hits)
            "#,
        );

        tracing::info!(url = %config.redis.url, "Connected to Redis rate limit storage");

        Ok(Self {
            conn,
            config,
            script,
            closed: AtomicBool::new(false),
        })
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }

    fn ttl_ms(&self, window: Duration) -> u64 {
        (window.as_millis() as u64).saturating_mul(self.config.retention_factor.max(1) as u64)
    }

    fn ensure_open(&self) -> Result<(), RateLimitError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RateLimitError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl RateLimitStorage for RedisStorage {
    async fn increment(
        &self,
        key: &str,
        hits: u64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowState, RateLimitError> {
        self.ensure_open()?;
        let window_start = window_start_for(now, window);
        let mut conn = self.conn.clone();

        let count: i64 = self
            .script
            .key(self.make_key(key))
            .arg(hits)
            .arg(window_start.timestamp_millis())
            .arg(window.as_millis() as u64)
            .arg(self.ttl_ms(window))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        Ok(WindowState {
            count: count.max(0) as u64,
            window_start,
            window,
        })
    }

    async fn get(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<WindowState>, RateLimitError> {
        self.ensure_open()?;
        let mut conn = self.conn.clone();

        let (start, stored_window, count): (Option<i64>, Option<u64>, Option<u64>) =
            redis::cmd("HMGET")
                .arg(self.make_key(key))
                .arg("start")
                .arg("window")
                .arg("count")
                .query_async(&mut conn)
                .await
                .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        let (Some(start), Some(stored_window), Some(count)) = (start, stored_window, count) else {
            return Ok(None);
        };

        let window_start = window_start_for(now, window);
        if start != window_start.timestamp_millis() || stored_window != window.as_millis() as u64 {
            return Ok(None);
        }

        Ok(Some(WindowState {
            count,
            window_start,
            window,
        }))
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        self.ensure_open()?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL")
            .arg(self.make_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), RateLimitError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("Redis rate limit storage closed");
        }
        Ok(())
    }
}
