//! Partition key strategies.
//!
//! A key generator maps a request to the quota bucket it is charged to.
//! Strategies are plain function values so callers can compose their own.

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::dev::ServiceRequest;
use actix_web::http::header;
use actix_web::web;

use quota_core::Limiter;

/// Maps a request to its partition key.
pub type KeyGenerator = Arc<dyn Fn(&ServiceRequest) -> String + Send + Sync>;

/// Extracts a user identity from a request, if one is present.
pub type UserIdExtractor = Arc<dyn Fn(&ServiceRequest) -> Option<String> + Send + Sync>;

/// Client address, preferring proxy headers over the socket peer.
///
/// Order: first `X-Forwarded-For` entry, then `X-Real-IP`, then the host
/// part of the peer address.
pub fn client_ip(req: &ServiceRequest) -> String {
    let headers = req.headers();

    if let Some(first) = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }

    if let Some(real_ip) = headers
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return real_ip.to_string();
    }

    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Default strategy: `ip:<address>`.
pub fn ip_key(req: &ServiceRequest) -> String {
    Limiter::build_key("ip", &client_ip(req))
}

/// `user:<id>`, or the IP key when the request carries no identity.
pub fn per_user_key(extract_user: UserIdExtractor) -> KeyGenerator {
    Arc::new(move |req: &ServiceRequest| match extract_user(req) {
        Some(user) => Limiter::build_key("user", &user),
        None => ip_key(req),
    })
}

/// Identity composed with the request path, so each route has its own quota.
pub fn per_endpoint_key(extract_user: UserIdExtractor) -> KeyGenerator {
    Arc::new(move |req: &ServiceRequest| {
        let identity = match extract_user(req) {
            Some(user) => Limiter::build_key("user", &user),
            None => ip_key(req),
        };
        Limiter::endpoint_key(&identity, req.path())
    })
}

/// API credential from `Authorization: Bearer`, `X-API-Key` or the
/// `api_key` query parameter, in that order.
pub fn api_key_extractor(req: &ServiceRequest) -> Option<String> {
    let headers = req.headers();

    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(token.to_string());
    }

    if let Some(key) = headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Some(key.to_string());
    }

    web::Query::<HashMap<String, String>>::from_query(req.query_string())
        .ok()
        .and_then(|q| q.into_inner().remove("api_key"))
        .filter(|v| !v.is_empty())
}

/// Identity read from a custom header, e.g. one set by an upstream auth proxy.
pub fn header_user_extractor(name: &'static str) -> UserIdExtractor {
    Arc::new(move |req: &ServiceRequest| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}
