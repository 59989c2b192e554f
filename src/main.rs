use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpResponse, HttpServer};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod audit;
mod auth;
mod error;
mod models;
mod moderation;
mod openapi;
mod rate_limit;
mod repo;
mod reports;
mod routes;
mod scheduler;
mod security;

use openapi::ApiDoc;
use rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use repo::Repo;
use routes::{config, AppState, SiteSettings};
use security::SecurityHeaders;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Environment comes from the outside (shell, systemd, container). The
    // .env file is only picked up in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping quill server");

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo: Arc<dyn Repo> = {
        let dir = std::env::var("QUILL_DATA_DIR").unwrap_or_else(|_| "data".to_string());
        info!(dir, "Using in-memory repository backend with JSON snapshot");
        Arc::new(repo::inmem::InMemRepo::with_snapshot(dir))
    };

    #[cfg(feature = "postgres-store")]
    let repo: Arc<dyn Repo> = {
        use sqlx::postgres::PgPoolOptions;
        let db_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&db_url)
            .expect("Failed to create Pg pool");
        info!("Using Postgres repository backend");
        Arc::new(repo::pg::PgRepo::new(pool))
    };

    let metrics_handle: PrometheusHandle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");

    let interval = std::env::var("SCHEDULER_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60);
    scheduler::spawn(repo.clone(), Duration::from_secs(interval));
    info!(interval, "Scheduler sweep running");

    let rate = RateLimiterFacade::new(
        InMemoryRateLimiter::new(
            std::env::var("RATE_LIMIT_ENABLED").map(|v| v != "0").unwrap_or(true),
        ),
        RateLimitConfig::from_env(),
    );
    let settings = SiteSettings::from_env();
    let state = AppState { repo, rate, settings };
    let openapi = ApiDoc::openapi();

    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        let handle = metrics_handle.clone();
        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_env())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi.clone()))
            .route(
                "/metrics",
                web::get().to(move || {
                    let body = handle.render();
                    async move { HttpResponse::Ok().content_type("text/plain").body(body) }
                }),
            )
    })
    .bind(("0.0.0.0", 8080))?;

    info!("Listening on http://0.0.0.0:8080");

    server.run().await?;
    Ok(())
}

/// Fail fast on misconfiguration instead of limping along.
fn validate_env_vars() -> anyhow::Result<()> {
    let secret = std::env::var("JWT_SECRET")
        .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set (see .env.example)"))?;
    if secret.len() < 32 {
        anyhow::bail!("JWT_SECRET must be at least 32 characters long");
    }
    Ok(())
}
