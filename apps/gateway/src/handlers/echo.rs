//! Sample rate-limited endpoint.

use actix_web::{HttpRequest, HttpResponse};
use serde::Serialize;

use crate::middleware::rate_limit::RateLimitStatus;

#[derive(Serialize)]
pub struct EchoResponse {
    pub path: String,
    pub query: String,
    /// Requests left in the caller's window, when rate limiting applied.
    pub remaining: Option<u64>,
}

/// GET /api/echo
pub async fn echo(req: HttpRequest, status: RateLimitStatus) -> HttpResponse {
    HttpResponse::Ok().json(EchoResponse {
        path: req.path().to_string(),
        query: req.query_string().to_string(),
        remaining: status.0.map(|result| result.remaining),
    })
}
