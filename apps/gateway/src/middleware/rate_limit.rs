//! Rate limiting middleware.
//!
//! Per request: skip-listed paths pass straight through. Otherwise the
//! request is keyed, the limiter is consulted, quota headers are written,
//! metrics are recorded, and the request is either forwarded or rejected.
//! Storage failures follow the configured [`FailurePolicy`].

use actix_web::{
    Error, FromRequest, HttpMessage, HttpRequest, HttpResponse,
    body::EitherBody,
    dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{self, HeaderMap, HeaderName, HeaderValue},
};
use quota_core::{Limiter, Metrics, RateLimitResult};
use quota_shared::ErrorResponse;
use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use super::key::{self, KeyGenerator, UserIdExtractor};

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Builds the response for a denied request.
pub type RejectionHandler = Arc<dyn Fn(&HttpRequest, &RateLimitResult) -> HttpResponse + Send + Sync>;

/// What to do when the limiter cannot reach its storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Respond 500 and do not forward.
    #[default]
    FailClosed,
    /// Forward without quota headers.
    FailOpen,
}

struct Inner {
    limiter: Arc<Limiter>,
    metrics: Arc<Metrics>,
    skip_paths: Vec<String>,
    key_generator: Option<KeyGenerator>,
    user_id_extractor: Option<UserIdExtractor>,
    partition_by_user: bool,
    partition_by_endpoint: bool,
    on_rate_limit_exceeded: RejectionHandler,
    failure_policy: FailurePolicy,
}

impl Inner {
    fn should_skip(&self, path: &str) -> bool {
        self.skip_paths.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Resolve the key strategy once, at transform time.
    fn resolved_key_generator(&self) -> KeyGenerator {
        if let Some(keygen) = &self.key_generator {
            return Arc::clone(keygen);
        }

        let extract_user: UserIdExtractor = match &self.user_id_extractor {
            Some(extract) => Arc::clone(extract),
            None => Arc::new(key::api_key_extractor),
        };

        if self.partition_by_endpoint {
            key::per_endpoint_key(extract_user)
        } else if self.partition_by_user || self.limiter.policy().partition_by_user {
            key::per_user_key(extract_user)
        } else {
            Arc::new(key::ip_key)
        }
    }
}

/// Rate limiting middleware factory.
#[derive(Clone)]
pub struct RateLimitMiddleware {
    inner: Arc<Inner>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<Limiter>) -> Self {
        Self {
            inner: Arc::new(Inner {
                limiter,
                metrics: Arc::new(Metrics::new()),
                skip_paths: Vec::new(),
                key_generator: None,
                user_id_extractor: None,
                partition_by_user: false,
                partition_by_endpoint: false,
                on_rate_limit_exceeded: Arc::new(default_rate_limit_exceeded),
                failure_policy: FailurePolicy::default(),
            }),
        }
    }

    fn update(mut self, f: impl FnOnce(&mut Inner)) -> Self {
        // Builders run before the factory is cloned into workers.
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            f(inner);
        } else {
            tracing::warn!("Rate limit middleware reconfigured after being shared; ignoring");
        }
        self
    }

    /// Path prefixes that bypass rate limiting entirely.
    pub fn skip_paths<I, P>(self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let paths: Vec<String> = paths.into_iter().map(Into::into).collect();
        self.update(|inner| inner.skip_paths = paths)
    }

    /// Override the partition key strategy.
    pub fn key_generator<F>(self, keygen: F) -> Self
    where
        F: Fn(&ServiceRequest) -> String + Send + Sync + 'static,
    {
        self.update(|inner| inner.key_generator = Some(Arc::new(keygen)))
    }

    /// How to find the user behind a request, for keys and metrics.
    pub fn user_id_extractor<F>(self, extractor: F) -> Self
    where
        F: Fn(&ServiceRequest) -> Option<String> + Send + Sync + 'static,
    {
        self.update(|inner| inner.user_id_extractor = Some(Arc::new(extractor)))
    }

    pub fn partition_by_user(self, enabled: bool) -> Self {
        self.update(|inner| inner.partition_by_user = enabled)
    }

    pub fn partition_by_endpoint(self, enabled: bool) -> Self {
        self.update(|inner| inner.partition_by_endpoint = enabled)
    }

    pub fn on_rate_limit_exceeded<F>(self, handler: F) -> Self
    where
        F: Fn(&HttpRequest, &RateLimitResult) -> HttpResponse + Send + Sync + 'static,
    {
        self.update(|inner| inner.on_rate_limit_exceeded = Arc::new(handler))
    }

    pub fn failure_policy(self, policy: FailurePolicy) -> Self {
        self.update(|inner| inner.failure_policy = policy)
    }

    /// Record into a shared metrics instance instead of a private one.
    pub fn metrics(self, metrics: Arc<Metrics>) -> Self {
        self.update(|inner| inner.metrics = metrics)
    }

    pub fn get_metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.inner.metrics)
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            key_generator: self.inner.resolved_key_generator(),
            keys_by_endpoint: self.inner.key_generator.is_none() && self.inner.partition_by_endpoint,
            inner: Arc::clone(&self.inner),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    key_generator: KeyGenerator,
    /// Keys already carry the request path.
    keys_by_endpoint: bool,
    inner: Arc<Inner>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let inner = Arc::clone(&self.inner);

        if inner.should_skip(req.path()) {
            return Box::pin(async move {
                let res = service.call(req).await?;
                Ok(res.map_into_left_body())
            });
        }

        let endpoint = req.path().to_string();
        let key = (self.key_generator)(&req);
        // An overridden route gets its own counter so its quota and the
        // global one never drain each other.
        let key = match inner.limiter.endpoint_override(&endpoint) {
            Some(_) if !self.keys_by_endpoint => Limiter::endpoint_key(&key, &endpoint),
            _ => key,
        };

        Box::pin(async move {
            let user = inner
                .user_id_extractor
                .as_ref()
                .and_then(|extract| extract(&req))
                .unwrap_or_default();

            let outcome = if inner.limiter.has_endpoint_limits() {
                inner.limiter.allow_for_endpoint(&key, &endpoint).await
            } else {
                inner.limiter.allow(&key).await
            };

            let result = match outcome {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(
                        key = %key,
                        error = %e,
                        policy = ?inner.failure_policy,
                        "Rate limiter storage failure"
                    );

                    return match inner.failure_policy {
                        FailurePolicy::FailClosed => {
                            inner.metrics.record_request(false, &endpoint, &user);
                            let error = ErrorResponse::internal_error()
                                .with_detail("Rate limiting is temporarily unavailable.")
                                .with_instance(endpoint);
                            let response = HttpResponse::InternalServerError().json(error);
                            let (http_req, _payload) = req.into_parts();
                            Ok(ServiceResponse::new(http_req, response).map_into_right_body())
                        }
                        FailurePolicy::FailOpen => {
                            inner.metrics.record_request(true, &endpoint, &user);
                            let res = service.call(req).await?;
                            Ok(res.map_into_left_body())
                        }
                    };
                }
            };

            inner.metrics.record_request(result.allowed, &endpoint, &user);

            if !result.allowed {
                tracing::debug!(
                    key = %key,
                    retry_after_secs = result.retry_after_secs(),
                    "Rate limit exceeded"
                );

                let (http_req, _payload) = req.into_parts();
                let mut response = (inner.on_rate_limit_exceeded)(&http_req, &result);
                set_rate_limit_headers(response.headers_mut(), &result);
                return Ok(ServiceResponse::new(http_req, response).map_into_right_body());
            }

            {
                let mut extensions = req.extensions_mut();
                extensions.insert(result.clone());
                extensions.insert(RateLimitKey(key));
            }
            let mut res = service.call(req).await?;
            set_rate_limit_headers(res.headers_mut(), &result);
            Ok(res.map_into_left_body())
        })
    }
}

/// Write the standard quota headers for a decision.
pub fn set_rate_limit_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    headers.insert(
        HeaderName::from_static(X_RATELIMIT_LIMIT),
        HeaderValue::from(result.limit),
    );
    headers.insert(
        HeaderName::from_static(X_RATELIMIT_REMAINING),
        HeaderValue::from(result.remaining),
    );
    headers.insert(
        HeaderName::from_static(X_RATELIMIT_RESET),
        HeaderValue::from(result.reset_at.timestamp()),
    );
    if !result.allowed {
        headers.insert(
            header::RETRY_AFTER,
            HeaderValue::from(result.retry_after_secs()),
        );
    }
}

/// Plain-text 429.
pub fn default_rate_limit_exceeded(_req: &HttpRequest, result: &RateLimitResult) -> HttpResponse {
    HttpResponse::TooManyRequests()
        .content_type("text/plain; charset=utf-8")
        .body(format!(
            "Rate limit exceeded. Retry after {} seconds.",
            result.retry_after_secs()
        ))
}

/// Partition key the current request was charged to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitKey(pub String);

/// Quota decision for the current request, as seen by handlers.
///
/// `None` when the request bypassed rate limiting (skip path or fail-open).
#[derive(Debug, Clone)]
pub struct RateLimitStatus(pub Option<RateLimitResult>);

impl FromRequest for RateLimitStatus {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(RateLimitStatus(
            req.extensions().get::<RateLimitResult>().cloned(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{App, test, web};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use quota_core::ports::{ManualClock, RateLimitError, RateLimitStorage};
    use quota_core::{Policy, WindowState};
    use quota_infra::MemoryStorage;
    use std::collections::HashMap;
    use std::time::Duration;

    struct DownStorage;

    #[async_trait]
    impl RateLimitStorage for DownStorage {
        async fn increment(
            &self,
            _key: &str,
            _hits: u64,
            _window: Duration,
            _now: DateTime<Utc>,
        ) -> Result<WindowState, RateLimitError> {
            Err(RateLimitError::Backend("connection refused".to_string()))
        }

        async fn get(
            &self,
            _key: &str,
            _window: Duration,
            _now: DateTime<Utc>,
        ) -> Result<Option<WindowState>, RateLimitError> {
            Err(RateLimitError::Backend("connection refused".to_string()))
        }

        async fn reset(&self, _key: &str) -> Result<(), RateLimitError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), RateLimitError> {
            Ok(())
        }
    }

    /// RFC 7807 JSON 429, for API clients that expect problem details.
    fn json_rate_limit_exceeded(req: &HttpRequest, result: &RateLimitResult) -> HttpResponse {
        let error = ErrorResponse::too_many_requests(format!(
            "Rate limit exceeded. Try again in {} seconds.",
            result.retry_after_secs()
        ))
        .with_instance(req.path());

        HttpResponse::TooManyRequests().json(error)
    }

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_040, 0).unwrap()
    }

    fn limiter(limit: u64) -> Arc<Limiter> {
        Arc::new(
            Limiter::new(
                Arc::new(MemoryStorage::default()),
                Policy::new(limit, Duration::from_secs(60)),
            )
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(start()))),
        )
    }

    async fn ok_handler() -> HttpResponse {
        HttpResponse::Ok().body("ok")
    }

    fn header_str<'a>(res: &'a ServiceResponse<impl actix_web::body::MessageBody>, name: &str) -> Option<&'a str> {
        res.headers().get(name).and_then(|v| v.to_str().ok())
    }

    fn from_ip(path: &str, ip: &str) -> test::TestRequest {
        test::TestRequest::get()
            .uri(path)
            .insert_header(("X-Forwarded-For", ip.to_string()))
    }

    #[actix_web::test]
    async fn test_allowed_request_carries_headers() {
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(limiter(10)))
                .route("/api/data", web::get().to(ok_handler)),
        )
        .await;

        let res = test::call_service(&app, from_ip("/api/data", "10.0.0.1").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(header_str(&res, "X-RateLimit-Limit"), Some("10"));
        assert_eq!(header_str(&res, "X-RateLimit-Remaining"), Some("9"));
        assert_eq!(header_str(&res, "X-RateLimit-Reset"), Some("1700000100"));
        assert!(res.headers().get(header::RETRY_AFTER).is_none());
    }

    #[actix_web::test]
    async fn test_blocked_request_gets_429() {
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(limiter(2)))
                .route("/api/data", web::get().to(ok_handler)),
        )
        .await;

        for _ in 0..2 {
            let res = test::call_service(&app, from_ip("/api/data", "10.0.0.1").to_request()).await;
            assert_eq!(res.status(), StatusCode::OK);
        }

        let res = test::call_service(&app, from_ip("/api/data", "10.0.0.1").to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(header_str(&res, "X-RateLimit-Remaining"), Some("0"));
        assert_eq!(header_str(&res, "Retry-After"), Some("60"));

        let body = test::read_body(res).await;
        assert_eq!(body, "Rate limit exceeded. Retry after 60 seconds.");

        // A different client has its own quota.
        let res = test::call_service(&app, from_ip("/api/data", "10.0.0.2").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_skip_paths_bypass_limiter_and_metrics() {
        let middleware = RateLimitMiddleware::new(limiter(1)).skip_paths(["/api/health"]);
        let metrics = middleware.get_metrics();
        let app = test::init_service(
            App::new()
                .wrap(middleware)
                .route("/api/health", web::get().to(ok_handler))
                .route("/api/health/ready", web::get().to(ok_handler)),
        )
        .await;

        for path in ["/api/health", "/api/health/ready", "/api/health"] {
            let res = test::call_service(&app, from_ip(path, "10.0.0.1").to_request()).await;
            assert_eq!(res.status(), StatusCode::OK);
            assert!(res.headers().get("X-RateLimit-Limit").is_none());
        }

        assert_eq!(metrics.get_stats().total_requests, 0);
    }

    #[actix_web::test]
    async fn test_per_user_quotas_are_independent() {
        let extract = key::header_user_extractor("X-User-ID");
        let app = test::init_service(
            App::new()
                .wrap(
                    RateLimitMiddleware::new(limiter(2))
                        .partition_by_user(true)
                        .user_id_extractor(move |req: &ServiceRequest| extract(req)),
                )
                .route("/api/data", web::get().to(ok_handler)),
        )
        .await;

        for user in ["alice", "bob"] {
            for expected in ["1", "0"] {
                let req = from_ip("/api/data", "10.0.0.1")
                    .insert_header(("X-User-ID", user))
                    .to_request();
                let res = test::call_service(&app, req).await;
                assert_eq!(res.status(), StatusCode::OK);
                assert_eq!(header_str(&res, "X-RateLimit-Remaining"), Some(expected));
            }
        }
    }

    #[actix_web::test]
    async fn test_custom_rejection_handler() {
        let app = test::init_service(
            App::new()
                .wrap(
                    RateLimitMiddleware::new(limiter(0))
                        .on_rate_limit_exceeded(json_rate_limit_exceeded),
                )
                .route("/api/data", web::get().to(ok_handler)),
        )
        .await;

        let res = test::call_service(&app, from_ip("/api/data", "10.0.0.1").to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(header_str(&res, "X-RateLimit-Limit"), Some("0"));
        assert!(res.headers().get(header::RETRY_AFTER).is_some());

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["status"], 429);
        assert_eq!(body["instance"], "/api/data");
    }

    #[actix_web::test]
    async fn test_custom_key_generator() {
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(limiter(1)).key_generator(|_| "global".to_string()))
                .route("/api/data", web::get().to(ok_handler)),
        )
        .await;

        let res = test::call_service(&app, from_ip("/api/data", "10.0.0.1").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let res = test::call_service(&app, from_ip("/api/data", "10.0.0.2").to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[actix_web::test]
    async fn test_metrics_recorded_per_endpoint_and_user() {
        let middleware = RateLimitMiddleware::new(limiter(1))
            .user_id_extractor(key::api_key_extractor);
        let metrics = middleware.get_metrics();
        let app = test::init_service(
            App::new()
                .wrap(middleware)
                .route("/api/data", web::get().to(ok_handler)),
        )
        .await;

        for _ in 0..3 {
            let req = from_ip("/api/data", "10.0.0.1")
                .insert_header(("Authorization", "Bearer alice"))
                .to_request();
            test::call_service(&app, req).await;
        }

        let stats = metrics.get_stats();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.allowed_requests, 1);
        assert_eq!(stats.blocked_requests, 2);
        assert_eq!(stats.requests_by_endpoint["/api/data"], 3);
        assert_eq!(stats.requests_by_user["alice"], 3);
    }

    #[actix_web::test]
    async fn test_storage_failure_fails_closed() {
        let limiter = Arc::new(
            Limiter::new(Arc::new(DownStorage), Policy::new(10, Duration::from_secs(60))).unwrap(),
        );
        let middleware = RateLimitMiddleware::new(limiter);
        let metrics = middleware.get_metrics();
        let app = test::init_service(
            App::new()
                .wrap(middleware)
                .route("/api/data", web::get().to(ok_handler)),
        )
        .await;

        let res = test::call_service(&app, from_ip("/api/data", "10.0.0.1").to_request()).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.headers().get("X-RateLimit-Limit").is_none());
        assert_eq!(metrics.get_stats().blocked_requests, 1);
    }

    #[actix_web::test]
    async fn test_storage_failure_fail_open_forwards() {
        let limiter = Arc::new(
            Limiter::new(Arc::new(DownStorage), Policy::new(10, Duration::from_secs(60))).unwrap(),
        );
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(limiter).failure_policy(FailurePolicy::FailOpen))
                .route("/api/data", web::get().to(ok_handler)),
        )
        .await;

        let res = test::call_service(&app, from_ip("/api/data", "10.0.0.1").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().get("X-RateLimit-Limit").is_none());
    }

    #[actix_web::test]
    async fn test_endpoint_override_has_its_own_counter() {
        let limiter = Arc::new(
            Limiter::new(
                Arc::new(MemoryStorage::default()),
                Policy::new(100, Duration::from_secs(60)),
            )
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(start())))
            .with_endpoint_limits(HashMap::from([("/api/heavy".to_string(), 1)])),
        );
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(limiter).partition_by_endpoint(false))
                .route("/api/heavy", web::get().to(ok_handler))
                .route("/api/light", web::get().to(ok_handler)),
        )
        .await;

        let res = test::call_service(&app, from_ip("/api/light", "10.0.0.1").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(header_str(&res, "X-RateLimit-Remaining"), Some("99"));

        let res = test::call_service(&app, from_ip("/api/heavy", "10.0.0.1").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(header_str(&res, "X-RateLimit-Limit"), Some("1"));
        assert_eq!(header_str(&res, "X-RateLimit-Remaining"), Some("0"));

        let res = test::call_service(&app, from_ip("/api/heavy", "10.0.0.1").to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

        // Heavy traffic did not touch the shared quota.
        let res = test::call_service(&app, from_ip("/api/light", "10.0.0.1").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(header_str(&res, "X-RateLimit-Remaining"), Some("98"));
    }

    #[actix_web::test]
    async fn test_endpoint_limits_and_status_extractor() {
        let limiter = Arc::new(
            Limiter::new(
                Arc::new(MemoryStorage::default()),
                Policy::new(5, Duration::from_secs(60)),
            )
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(start())))
            .with_endpoint_limits(HashMap::from([("/api/heavy".to_string(), 1)])),
        );

        async fn remaining(status: RateLimitStatus) -> HttpResponse {
            let remaining = status.0.map(|r| r.remaining).unwrap_or(u64::MAX);
            HttpResponse::Ok().body(remaining.to_string())
        }

        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(limiter).partition_by_endpoint(true))
                .route("/api/heavy", web::get().to(remaining))
                .route("/api/light", web::get().to(remaining)),
        )
        .await;

        let res = test::call_service(&app, from_ip("/api/heavy", "10.0.0.1").to_request()).await;
        assert_eq!(header_str(&res, "X-RateLimit-Limit"), Some("1"));
        assert_eq!(test::read_body(res).await, "0");

        let res = test::call_service(&app, from_ip("/api/heavy", "10.0.0.1").to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

        let res = test::call_service(&app, from_ip("/api/light", "10.0.0.1").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(header_str(&res, "X-RateLimit-Limit"), Some("5"));
        assert_eq!(test::read_body(res).await, "4");
    }
}
