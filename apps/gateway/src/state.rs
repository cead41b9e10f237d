//! Application state - shared across all handlers.

use std::sync::Arc;

use quota_core::ports::{RateLimitError, RateLimitStorage};
use quota_core::{Limiter, Metrics};
use quota_infra::{MemoryStorage, MemoryStorageConfig};

use crate::config::{AppConfig, RateLimitSettings, StorageBackend};
use crate::middleware::key;
use crate::middleware::rate_limit::{FailurePolicy, RateLimitMiddleware};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<Limiter>,
    pub metrics: Arc<Metrics>,
    pub storage: Arc<dyn RateLimitStorage>,
    pub settings: RateLimitSettings,
}

impl AppState {
    /// Build the application state with the configured storage backend.
    pub async fn new(config: &AppConfig) -> Result<Self, RateLimitError> {
        let settings = config.rate_limit.clone();
        let storage = Self::build_storage(config).await?;

        let mut limiter = Limiter::new(Arc::clone(&storage), settings.policy())?
            .with_endpoint_limits(settings.endpoint_limits.clone());
        if let Some(timeout) = settings.storage_timeout {
            limiter = limiter.with_storage_timeout(timeout);
        }

        tracing::info!(
            limit = settings.requests,
            window_ms = settings.window.as_millis() as u64,
            per_user = settings.per_user,
            per_endpoint = settings.per_endpoint,
            endpoint_overrides = settings.endpoint_limits.len(),
            "Application state initialized"
        );

        Ok(Self {
            limiter: Arc::new(limiter),
            metrics: Arc::new(Metrics::new()),
            storage,
            settings,
        })
    }

    async fn build_storage(config: &AppConfig) -> Result<Arc<dyn RateLimitStorage>, RateLimitError> {
        match config.rate_limit.storage {
            StorageBackend::Memory => Ok(Self::memory_storage(&config.rate_limit)),
            StorageBackend::Redis => Self::redis_storage(config).await,
        }
    }

    fn memory_storage(settings: &RateLimitSettings) -> Arc<dyn RateLimitStorage> {
        let storage = MemoryStorage::new(MemoryStorageConfig {
            retention_factor: settings.retention_factor,
            ..MemoryStorageConfig::for_window(settings.window)
        });
        storage.start_sweeper();
        tracing::info!("Using in-memory rate limit storage");
        Arc::new(storage)
    }

    #[cfg(feature = "redis")]
    async fn redis_storage(config: &AppConfig) -> Result<Arc<dyn RateLimitStorage>, RateLimitError> {
        use quota_infra::{RedisConfig, RedisStorage, RedisStorageConfig};

        let storage_config = RedisStorageConfig {
            redis: RedisConfig {
                url: config.redis.url.clone(),
                connect_timeout: config.redis.connect_timeout,
                fallback_to_memory: config.redis.fallback_to_memory,
            },
            key_prefix: config.rate_limit.key_prefix.clone(),
            retention_factor: config.rate_limit.retention_factor,
        };

        match RedisStorage::new(storage_config).await {
            Ok(storage) => Ok(Arc::new(storage)),
            Err(e) if config.redis.fallback_to_memory => {
                tracing::warn!(
                    error = %e,
                    "Failed to connect to Redis. Falling back to in-memory storage."
                );
                Ok(Self::memory_storage(&config.rate_limit))
            }
            Err(e) => Err(e),
        }
    }

    #[cfg(not(feature = "redis"))]
    async fn redis_storage(config: &AppConfig) -> Result<Arc<dyn RateLimitStorage>, RateLimitError> {
        if config.redis.fallback_to_memory {
            tracing::warn!("Built without redis feature - using in-memory storage");
            return Ok(Self::memory_storage(&config.rate_limit));
        }
        Err(RateLimitError::Config(
            "RATE_LIMIT_STORAGE=redis requires the redis feature".to_string(),
        ))
    }

    /// Middleware wired to this state's limiter and metrics.
    pub fn rate_limit_middleware(&self) -> RateLimitMiddleware {
        let failure_policy = if self.settings.fail_open {
            FailurePolicy::FailOpen
        } else {
            FailurePolicy::FailClosed
        };

        RateLimitMiddleware::new(Arc::clone(&self.limiter))
            .metrics(Arc::clone(&self.metrics))
            .skip_paths(self.settings.skip_paths.clone())
            .partition_by_user(self.settings.per_user)
            .partition_by_endpoint(self.settings.per_endpoint)
            .user_id_extractor(key::api_key_extractor)
            .failure_policy(failure_policy)
    }

    /// Release the storage backend.
    pub async fn shutdown(&self) {
        match self.storage.close().await {
            Ok(()) => tracing::info!("Rate limit storage closed"),
            Err(e) => tracing::error!(error = %e, "Failed to close rate limit storage"),
        }
    }
}
