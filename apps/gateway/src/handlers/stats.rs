//! Rate limiting statistics and quota inspection.

use actix_web::{HttpMessage, HttpRequest, HttpResponse, web};
use quota_core::Limiter;
use serde::Deserialize;
use quota_shared::ApiResponse;
use quota_shared::dto::{QuotaStatusResponse, RankedEntry, StatsResponse};

use crate::middleware::error::{AppError, AppResult};
use crate::middleware::rate_limit::RateLimitKey;
use crate::state::AppState;

const TOP_N: usize = 10;

/// GET /api/ratelimit/stats
pub async fn get_stats(state: web::Data<AppState>) -> HttpResponse {
    let snapshot = state.metrics.get_stats();
    let ranked = |entries: Vec<quota_core::DimensionEntry>| -> Vec<RankedEntry> {
        entries
            .into_iter()
            .map(|e| RankedEntry {
                key: e.key,
                count: e.count,
            })
            .collect()
    };

    let response = StatsResponse {
        total_requests: snapshot.total_requests,
        allowed_requests: snapshot.allowed_requests,
        blocked_requests: snapshot.blocked_requests,
        blocked_rate: state.metrics.blocked_rate(),
        requests_by_endpoint: snapshot.requests_by_endpoint,
        requests_by_user: snapshot.requests_by_user,
        top_endpoints: ranked(state.metrics.get_top_endpoints(TOP_N)),
        top_users: ranked(state.metrics.get_top_users(TOP_N)),
        since: snapshot.since,
    };

    HttpResponse::Ok().json(ApiResponse::ok(response))
}

/// POST /api/ratelimit/stats/reset
pub async fn reset_stats(state: web::Data<AppState>) -> HttpResponse {
    state.metrics.reset();
    tracing::info!("Rate limit metrics reset");
    HttpResponse::Ok().json(ApiResponse::message("Metrics reset"))
}

/// GET /api/ratelimit/status
///
/// Quota left for the key this request was charged to, without charging it
/// again.
pub async fn quota_status(req: HttpRequest, state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let key = req
        .extensions()
        .get::<RateLimitKey>()
        .map(|k| k.0.clone())
        .ok_or_else(|| AppError::NotFound("No rate limit applies to this request".to_string()))?;

    let result = state.limiter.peek_for_endpoint(&key, req.path()).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(QuotaStatusResponse {
        key,
        limit: result.limit,
        remaining: result.remaining,
        reset_at: result.reset_at.timestamp(),
    })))
}

/// Which quota to clear. `key` wins over `user`, which wins over `ip`.
#[derive(Debug, Deserialize)]
pub struct ResetQuery {
    pub key: Option<String>,
    pub user: Option<String>,
    pub ip: Option<String>,
}

impl ResetQuery {
    fn partition_key(self) -> Option<String> {
        let non_empty = |v: Option<String>| v.filter(|v| !v.trim().is_empty());
        non_empty(self.key)
            .or_else(|| non_empty(self.user).map(|user| Limiter::build_key("user", &user)))
            .or_else(|| non_empty(self.ip).map(|ip| Limiter::build_key("ip", &ip)))
    }
}

/// POST /api/ratelimit/reset?ip=|user=|key=
///
/// Clears one partition's window. Route-scoped counters for endpoint
/// overrides are separate keys and need `key=` to be cleared.
pub async fn reset_quota(
    state: web::Data<AppState>,
    query: web::Query<ResetQuery>,
) -> AppResult<HttpResponse> {
    let key = query.into_inner().partition_key().ok_or_else(|| {
        AppError::BadRequest("One of key, user or ip is required".to_string())
    })?;

    state.limiter.reset(&key).await?;
    tracing::info!(key = %key, "Rate limit reset");

    Ok(HttpResponse::Ok().json(ApiResponse::message(format!("Rate limit reset for {key}"))))
}
