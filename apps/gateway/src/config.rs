//! Application configuration loaded from environment variables.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use quota_core::Policy;

/// Configuration errors abort startup.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            var,
            reason: reason.into(),
        }
    }
}

/// Which storage backend holds the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Redis,
}

/// Redis connection settings.
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub connect_timeout: Duration,
    pub fallback_to_memory: bool,
}

/// Rate limiting configuration.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub requests: u64,
    pub window: Duration,
    pub per_user: bool,
    pub per_endpoint: bool,
    pub skip_paths: Vec<String>,
    /// Exact-path overrides of `requests`.
    pub endpoint_limits: HashMap<String, u64>,
    pub fail_open: bool,
    pub storage: StorageBackend,
    pub retention_factor: u32,
    pub storage_timeout: Option<Duration>,
    pub key_prefix: String,
}

impl RateLimitSettings {
    pub fn policy(&self) -> Policy {
        Policy::new(self.requests, self.window).per_user(self.per_user)
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit: RateLimitSettings,
    pub redis: RedisSettings,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let window = match vars.parse::<u64>("RATE_LIMIT_WINDOW_MS")? {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_secs(vars.parse("RATE_LIMIT_WINDOW_SECS")?.unwrap_or(60)),
        };
        if window.as_millis() == 0 {
            return Err(ConfigError::invalid(
                "RATE_LIMIT_WINDOW_SECS",
                "window must be at least 1ms",
            ));
        }

        let storage = match vars.get("RATE_LIMIT_STORAGE").as_deref() {
            None | Some("memory") => StorageBackend::Memory,
            Some("redis") => StorageBackend::Redis,
            Some(other) => {
                return Err(ConfigError::invalid(
                    "RATE_LIMIT_STORAGE",
                    format!("unknown backend '{other}', expected memory or redis"),
                ));
            }
        };

        let retention_factor = vars.parse::<u32>("RATE_LIMIT_RETENTION_FACTOR")?.unwrap_or(2);
        if retention_factor == 0 {
            return Err(ConfigError::invalid(
                "RATE_LIMIT_RETENTION_FACTOR",
                "must be at least 1",
            ));
        }

        let skip_paths = match vars.get("RATE_LIMIT_SKIP_PATHS") {
            Some(raw) => split_list(&raw).map(str::to_string).collect(),
            None => vec!["/api/health".to_string()],
        };

        let endpoint_limits = match vars.get("RATE_LIMIT_ENDPOINT_LIMITS") {
            Some(raw) => parse_endpoint_limits(&raw)?,
            None => HashMap::new(),
        };

        let rate_limit = RateLimitSettings {
            requests: vars.parse("RATE_LIMIT_REQUESTS")?.unwrap_or(100),
            window,
            per_user: vars.flag("RATE_LIMIT_PER_USER")?.unwrap_or(false),
            per_endpoint: vars.flag("RATE_LIMIT_PER_ENDPOINT")?.unwrap_or(false),
            skip_paths,
            endpoint_limits,
            fail_open: vars.flag("RATE_LIMIT_FAIL_OPEN")?.unwrap_or(false),
            storage,
            retention_factor,
            storage_timeout: vars
                .parse::<u64>("RATE_LIMIT_STORAGE_TIMEOUT_MS")?
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            key_prefix: vars
                .get("RATE_LIMIT_KEY_PREFIX")
                .unwrap_or_else(|| "ratelimit".to_string()),
        };

        let redis = RedisSettings {
            url: vars
                .get("REDIS_URL")
                .unwrap_or_else(|| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                vars.parse("REDIS_CONNECT_TIMEOUT_SECS")?.unwrap_or(5),
            ),
            fallback_to_memory: vars.flag("REDIS_FALLBACK_TO_MEMORY")?.unwrap_or(true),
        };

        Ok(Self {
            host: vars.get("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: vars.parse("PORT")?.unwrap_or(8080),
            rate_limit,
            redis,
        })
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value; blank counts as unset.
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, var: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(var)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| ConfigError::invalid(var, format!("'{raw}': {e}")))
            })
            .transpose()
    }

    fn flag(&self, var: &'static str) -> Result<Option<bool>, ConfigError> {
        self.get(var)
            .map(|raw| match raw.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::invalid(var, format!("'{raw}' is not a boolean"))),
            })
            .transpose()
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Parse `"/path=N,/other=M"`.
fn parse_endpoint_limits(raw: &str) -> Result<HashMap<String, u64>, ConfigError> {
    const VAR: &str = "RATE_LIMIT_ENDPOINT_LIMITS";

    split_list(raw)
        .map(|entry| {
            let (path, limit) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::invalid(VAR, format!("'{entry}' is not path=limit")))?;
            let limit = limit
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::invalid(VAR, format!("'{entry}': {e}")))?;
            Ok((path.trim().to_string(), limit))
        })
        .collect()
}
