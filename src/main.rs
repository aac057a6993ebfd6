use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use actix_web_prom::PrometheusMetricsBuilder;
use sqlx::PgPool;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use sponsorblock_segments::config::Config;
use sponsorblock_segments::routes::{configure_routes, ApiDoc};
use sponsorblock_segments::state::AppState;

async fn connect(url: &str, name: &str) -> std::io::Result<PgPool> {
    PgPool::connect(url).await.map_err(|e| {
        error!("Failed to create {} database pool: {}", name, e);
        std::io::Error::new(std::io::ErrorKind::Other, e)
    })
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    debug!("Server will bind to: {}", config.server_bind_address());

    let pool = connect(&config.database_url, "public").await?;
    let private_pool = connect(&config.private_database_url, "private").await?;

    let state = web::Data::new(AppState::from_pools(&config, pool, private_pool));

    info!("Starting server on {} with {} workers", config.server_bind_address(), config.workers);

    // Create Prometheus metrics
    let prometheus = PrometheusMetricsBuilder::new(&config.metrics_namespace)
        .endpoint("/metrics")
        .build()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .supports_credentials();

        App::new()
            .app_data(state.clone())
            .wrap(prometheus.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()))
            .configure(configure_routes)
    })
    .workers(config.workers)
    .bind(config.server_bind_address())?
    .run()
    .await
}
