//! HTTP handlers and route configuration.

mod echo;
mod health;
mod stats;

use actix_web::{HttpRequest, HttpResponse, web};
use quota_shared::ErrorResponse;

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            // Public routes
            .route("/health", web::get().to(health::health_check))
            .route("/echo", web::get().to(echo::echo))
            // Rate limiting admin
            .service(
                web::scope("/ratelimit")
                    .route("/stats", web::get().to(stats::get_stats))
                    .route("/stats/reset", web::post().to(stats::reset_stats))
                    .route("/reset", web::post().to(stats::reset_quota))
                    .route("/status", web::get().to(stats::quota_status)),
            ),
    );
}

/// Fallback for unmatched routes.
pub async fn not_found(req: HttpRequest) -> HttpResponse {
    HttpResponse::NotFound()
        .json(ErrorResponse::not_found("No route matches this path").with_instance(req.path()))
}
