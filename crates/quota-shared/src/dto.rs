//! Data Transfer Objects - request/response types for the admin API.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of a top-N ranking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RankedEntry {
    pub key: String,
    pub count: u64,
}

/// Response containing rate limiting traffic statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub blocked_requests: u64,
    /// Percentage of requests that were blocked.
    pub blocked_rate: f64,
    pub requests_by_endpoint: HashMap<String, u64>,
    pub requests_by_user: HashMap<String, u64>,
    pub top_endpoints: Vec<RankedEntry>,
    pub top_users: Vec<RankedEntry>,
    pub since: DateTime<Utc>,
}

/// Response describing the caller's own quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaStatusResponse {
    pub key: String,
    pub limit: u64,
    pub remaining: u64,
    /// Unix timestamp (seconds) at which the window resets.
    pub reset_at: i64,
}
