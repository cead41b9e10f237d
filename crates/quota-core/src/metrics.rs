//! Allowed/blocked traffic counters.
//!
//! Aggregates are lock-free atomics. The per-endpoint and per-user maps sit
//! behind one narrow mutex that is held only while a map entry is bumped or
//! copied, so a snapshot never stalls the aggregate counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Traffic metrics observed by the HTTP layer.
#[derive(Debug)]
pub struct Metrics {
    allowed: AtomicU64,
    blocked: AtomicU64,
    dimensions: Mutex<Dimensions>,
}

#[derive(Debug)]
struct Dimensions {
    endpoints: HashMap<String, DimensionCount>,
    users: HashMap<String, DimensionCount>,
    next_seq: u64,
    since: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct DimensionCount {
    count: u64,
    first_seen: u64,
}

impl Dimensions {
    fn new() -> Self {
        Self {
            endpoints: HashMap::new(),
            users: HashMap::new(),
            next_seq: 0,
            since: Utc::now(),
        }
    }

    fn bump(map: &mut HashMap<String, DimensionCount>, next_seq: &mut u64, key: &str) {
        if let Some(entry) = map.get_mut(key) {
            entry.count += 1;
            return;
        }
        map.insert(
            key.to_string(),
            DimensionCount {
                count: 1,
                first_seen: *next_seq,
            },
        );
        *next_seq += 1;
    }
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub blocked_requests: u64,
    pub requests_by_endpoint: HashMap<String, u64>,
    pub requests_by_user: HashMap<String, u64>,
    /// When counting started, i.e. construction or the last reset.
    pub since: DateTime<Utc>,
}

/// One row of a top-N report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionEntry {
    pub key: String,
    pub count: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            allowed: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            dimensions: Mutex::new(Dimensions::new()),
        }
    }

    /// Record one admission decision.
    ///
    /// An empty `endpoint` or `user` skips that dimension; the aggregate
    /// counters are always updated.
    pub fn record_request(&self, allowed: bool, endpoint: &str, user: &str) {
        if allowed {
            self.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.blocked.fetch_add(1, Ordering::Relaxed);
        }

        if endpoint.is_empty() && user.is_empty() {
            return;
        }

        let mut dims = self.dimensions.lock();
        let Dimensions {
            endpoints,
            users,
            next_seq,
            ..
        } = &mut *dims;
        if !endpoint.is_empty() {
            Dimensions::bump(endpoints, next_seq, endpoint);
        }
        if !user.is_empty() {
            Dimensions::bump(users, next_seq, user);
        }
    }

    pub fn get_stats(&self) -> MetricsSnapshot {
        let (requests_by_endpoint, requests_by_user, since) = {
            let dims = self.dimensions.lock();
            (
                flatten(&dims.endpoints),
                flatten(&dims.users),
                dims.since,
            )
        };

        let allowed_requests = self.allowed.load(Ordering::Relaxed);
        let blocked_requests = self.blocked.load(Ordering::Relaxed);

        MetricsSnapshot {
            // Derived so that the sum invariant holds for every snapshot.
            total_requests: allowed_requests + blocked_requests,
            allowed_requests,
            blocked_requests,
            requests_by_endpoint,
            requests_by_user,
            since,
        }
    }

    /// Percentage of requests that were blocked, 0.0 when nothing was seen.
    pub fn blocked_rate(&self) -> f64 {
        let allowed = self.allowed.load(Ordering::Relaxed);
        let blocked = self.blocked.load(Ordering::Relaxed);
        let total = allowed + blocked;
        if total == 0 {
            0.0
        } else {
            blocked as f64 / total as f64 * 100.0
        }
    }

    /// Zero every counter and start a new epoch.
    pub fn reset(&self) {
        let mut dims = self.dimensions.lock();
        self.allowed.store(0, Ordering::Relaxed);
        self.blocked.store(0, Ordering::Relaxed);
        *dims = Dimensions::new();
    }

    /// Busiest endpoints, descending; ties keep first-seen order.
    pub fn get_top_endpoints(&self, n: usize) -> Vec<DimensionEntry> {
        top_n(&self.dimensions.lock().endpoints, n)
    }

    /// Busiest users, descending; ties keep first-seen order.
    pub fn get_top_users(&self, n: usize) -> Vec<DimensionEntry> {
        top_n(&self.dimensions.lock().users, n)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn flatten(map: &HashMap<String, DimensionCount>) -> HashMap<String, u64> {
    map.iter().map(|(k, v)| (k.clone(), v.count)).collect()
}

fn top_n(map: &HashMap<String, DimensionCount>, n: usize) -> Vec<DimensionEntry> {
    let mut rows: Vec<(&String, &DimensionCount)> = map.iter().collect();
    rows.sort_by(|a, b| {
        b.1.count
            .cmp(&a.1.count)
            .then(a.1.first_seen.cmp(&b.1.first_seen))
    });
    rows.into_iter()
        .take(n)
        .map(|(key, v)| DimensionEntry {
            key: key.clone(),
            count: v.count,
        })
        .collect()
}
