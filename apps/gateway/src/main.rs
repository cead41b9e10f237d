//! # Quota Gateway
//!
//! The main entry point for the rate-limited Actix-web HTTP server.

use actix_web::{App, HttpServer, web};
use anyhow::Context;
use tracing_actix_web::TracingLogger;

mod config;
mod handlers;
mod middleware;
mod state;
mod telemetry;

use config::AppConfig;
use state::AppState;
use telemetry::{TelemetryConfig, init_telemetry};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_telemetry(&TelemetryConfig::from_env());

    let config = AppConfig::from_env().context("Invalid configuration")?;

    tracing::info!(
        "Starting Quota Gateway on {}:{}",
        config.host,
        config.port
    );

    let state = AppState::new(&config)
        .await
        .context("Failed to initialize rate limiter")?;

    let server_state = state.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(server_state.rate_limit_middleware())
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(server_state.clone()))
            .configure(handlers::configure_routes)
            .default_service(web::to(handlers::not_found))
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?
    .run()
    .await?;

    state.shutdown().await;
    tracing::info!("Quota Gateway stopped");
    Ok(())
}
