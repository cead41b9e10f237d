//! In-memory fixed-window storage backed by a sharded map.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use quota_core::domain::{WindowState, window_start_for};
use quota_core::ports::{Clock, RateLimitError, RateLimitStorage, SystemClock};

/// In-memory storage configuration.
#[derive(Debug, Clone)]
pub struct MemoryStorageConfig {
    /// How often idle windows are swept.
    pub sweep_interval: Duration,
    /// Windows are reclaimed once `now - window_start > window * retention_factor`.
    pub retention_factor: u32,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            retention_factor: 2,
        }
    }
}

impl MemoryStorageConfig {
    /// Sweep once per window, the default cadence for a single-policy limiter.
    pub fn for_window(window: Duration) -> Self {
        Self {
            sweep_interval: window,
            ..Self::default()
        }
    }
}

struct Sweeper {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// In-memory storage using a `DashMap` of per-key windows.
///
/// Rollover and increment for a key run inside one shard-locked entry, so
/// racing callers at a window boundary see distinct counts and unrelated
/// keys in other shards never wait on each other.
/// Note: Limits are per-process, not distributed across instances.
pub struct MemoryStorage {
    windows: Arc<DashMap<String, WindowState>>,
    config: MemoryStorageConfig,
    clock: Arc<dyn Clock>,
    closed: AtomicBool,
    sweeper: Mutex<Option<Sweeper>>,
}

impl MemoryStorage {
    /// Create a storage without background maintenance.
    ///
    /// Call [`MemoryStorage::start_sweeper`] to bound memory for
    /// high-cardinality keys.
    pub fn new(config: MemoryStorageConfig) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            config,
            clock: Arc::new(SystemClock),
            closed: AtomicBool::new(false),
            sweeper: Mutex::new(None),
        }
    }

    /// Clock used by the sweeper to judge staleness.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Spawn the periodic sweep on the current tokio runtime.
    ///
    /// Does nothing if a sweeper is already running or the storage is closed.
    pub fn start_sweeper(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let mut slot = self.sweeper.lock();
        if slot.is_some() {
            return;
        }

        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let windows = Arc::clone(&self.windows);
        let clock = Arc::clone(&self.clock);
        let interval = self.config.sweep_interval.max(Duration::from_millis(1));
        let retention_factor = self.config.retention_factor;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let removed = sweep(&windows, clock.now(), retention_factor);
                        if removed > 0 {
                            tracing::debug!(
                                removed,
                                tracked = windows.len(),
                                "Swept idle rate limit windows"
                            );
                        }
                    }
                }
            }

            tracing::debug!("Rate limit sweeper stopped");
        });

        tracing::info!(
            interval_ms = interval.as_millis() as u64,
            retention_factor,
            "Started rate limit sweeper"
        );
        *slot = Some(Sweeper { shutdown, handle });
    }

    /// Remove idle windows now. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        sweep(&self.windows, self.clock.now(), self.config.retention_factor)
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    fn ensure_open(&self) -> Result<(), RateLimitError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RateLimitError::Closed);
        }
        Ok(())
    }
}

fn account(
    state: &mut WindowState,
    window_start: DateTime<Utc>,
    window: Duration,
    hits: u64,
) -> WindowState {
    if state.window_start != window_start || state.window != window {
        *state = WindowState::new(window_start, window);
    }
    state.count = state.count.saturating_add(hits);
    *state
}

fn sweep(windows: &DashMap<String, WindowState>, now: DateTime<Utc>, retention_factor: u32) -> usize {
    let before = windows.len();
    windows.retain(|_, state| !state.is_stale(now, retention_factor));
    before.saturating_sub(windows.len())
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(MemoryStorageConfig::default())
    }
}

#[async_trait]
impl RateLimitStorage for MemoryStorage {
    async fn increment(
        &self,
        key: &str,
        hits: u64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<WindowState, RateLimitError> {
        self.ensure_open()?;
        let window_start = window_start_for(now, window);

        // Fast path avoids allocating the key for windows we already track.
        if let Some(mut state) = self.windows.get_mut(key) {
            return Ok(account(&mut state, window_start, window, hits));
        }

        let mut state = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| WindowState::new(window_start, window));
        Ok(account(&mut state, window_start, window, hits))
    }

    async fn get(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<WindowState>, RateLimitError> {
        self.ensure_open()?;
        Ok(self
            .windows
            .get(key)
            .map(|state| *state)
            .filter(|state| state.window == window && state.is_current(now)))
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        self.ensure_open()?;
        self.windows.remove(key);
        Ok(())
    }

    async fn close(&self) -> Result<(), RateLimitError> {
        self.closed.store(true, Ordering::Release);

        let sweeper = self.sweeper.lock().take();
        if let Some(Sweeper { shutdown, handle }) = sweeper {
            let _ = shutdown.send(());
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Rate limit sweeper exited abnormally");
            }
            tracing::info!("Memory rate limit storage closed");
        }
        Ok(())
    }
}

impl Drop for MemoryStorage {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quota_core::ports::ManualClock;
    use quota_core::{Limiter, Policy};

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_040, 0).unwrap()
    }

    #[tokio::test]
    async fn test_increment() {
        let storage = MemoryStorage::default();
        let window = Duration::from_secs(60);

        let first = storage.increment("test-key", 1, window, start()).await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.window_start, start());

        let second = storage.increment("test-key", 1, window, start()).await.unwrap();
        assert_eq!(second.count, 2);
    }

    #[tokio::test]
    async fn test_window_rollover_starts_fresh() {
        let storage = MemoryStorage::default();
        let window = Duration::from_millis(100);

        storage.increment("k", 1, window, start()).await.unwrap();
        storage.increment("k", 1, window, start()).await.unwrap();

        let later = start() + chrono::Duration::milliseconds(150);
        let state = storage.increment("k", 1, window, later).await.unwrap();
        assert_eq!(state.count, 1);
        assert_eq!(state.window_start, start() + chrono::Duration::milliseconds(100));
    }

    #[tokio::test]
    async fn test_get_and_reset() {
        let storage = MemoryStorage::default();
        let window = Duration::from_secs(60);

        assert_eq!(storage.get("k", window, start()).await.unwrap(), None);

        storage.increment("k", 3, window, start()).await.unwrap();
        let state = storage.get("k", window, start()).await.unwrap().unwrap();
        assert_eq!(state.count, 3);

        let next_window = start() + chrono::Duration::seconds(60);
        assert_eq!(storage.get("k", window, next_window).await.unwrap(), None);

        storage.reset("k").await.unwrap();
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let storage = MemoryStorage::default();
        let window = Duration::from_secs(1);

        for _ in 0..3 {
            storage.increment("a", 1, window, start()).await.unwrap();
        }
        let b = storage.increment("b", 1, window, start()).await.unwrap();
        assert_eq!(b.count, 1);
        assert_eq!(storage.len(), 2);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_stale_windows() {
        let clock = ManualClock::new(start());
        let storage = MemoryStorage::new(MemoryStorageConfig::for_window(Duration::from_secs(1)))
            .with_clock(Arc::new(clock.clone()));
        let window = Duration::from_secs(1);

        storage.increment("idle", 1, window, start()).await.unwrap();
        clock.advance(Duration::from_millis(2500));
        storage.increment("busy", 1, window, clock.now()).await.unwrap();

        assert_eq!(storage.sweep_expired(), 1);
        assert_eq!(storage.len(), 1);
        assert!(storage.get("busy", window, clock.now()).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper_and_close() {
        let clock = ManualClock::new(start());
        let storage = MemoryStorage::new(MemoryStorageConfig {
            sweep_interval: Duration::from_secs(1),
            retention_factor: 2,
        })
        .with_clock(Arc::new(clock.clone()));
        storage.start_sweeper();

        storage
            .increment("10.0.0.1", 1, Duration::from_secs(1), start())
            .await
            .unwrap();
        clock.advance(Duration::from_secs(3));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(storage.is_empty());

        storage.close().await.unwrap();
        storage.close().await.unwrap();
        assert_eq!(
            storage
                .increment("k", 1, Duration::from_secs(1), start())
                .await
                .unwrap_err(),
            RateLimitError::Closed
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_rollover_race_has_single_first() {
        let storage = Arc::new(MemoryStorage::default());
        let window = Duration::from_secs(1);
        storage.increment("k", 5, window, start()).await.unwrap();

        let boundary = start() + chrono::Duration::seconds(1);
        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let storage = Arc::clone(&storage);
                tokio::spawn(async move {
                    storage.increment("k", 1, window, boundary).await.unwrap().count
                })
            })
            .collect();

        let mut counts = Vec::new();
        for task in tasks {
            counts.push(task.await.unwrap());
        }
        counts.sort_unstable();
        assert_eq!(counts, (1..=64).collect::<Vec<u64>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allow_admits_exactly_limit() {
        let clock = ManualClock::new(start());
        let storage = Arc::new(MemoryStorage::default());
        let limiter = Arc::new(
            Limiter::new(storage.clone(), Policy::new(10, Duration::from_secs(60)))
                .unwrap()
                .with_clock(Arc::new(clock.clone())),
        );

        let tasks: Vec<_> = (0..100)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.allow("shared").await.unwrap().allowed })
            })
            .collect();

        let mut allowed = 0;
        for task in tasks {
            if task.await.unwrap() {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 10);
        let state = storage
            .get("shared", Duration::from_secs(60), clock.now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.count, 100);
    }
}
