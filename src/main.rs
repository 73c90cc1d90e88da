pub mod api;
mod cache;
mod config;
mod mappings;
mod models;
mod providers;
mod services;
mod timefmt;

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use mappings::MappingSync;
use providers::history::ClickHouseStore;
use providers::live::RedisLiveStore;
use providers::mappings::PostgresMappingStore;
use services::VehicleService;

#[derive(OpenApi)]
#[openapi(
    info(title = "Fleet Trail API", version = "0.2.0"),
    paths(
        api::vehicles::get_vehicles,
        api::route_vehicles::get_route_vehicles,
        api::coverage::get_daily_coverage,
        api::directions::get_directions,
        api::admin::refresh_mappings,
        api::admin::invalidate_cache,
        api::health::health_check,
    ),
    components(schemas(
        api::ErrorResponse,
        api::admin::RefreshResponse,
        api::admin::InvalidateRequest,
        api::admin::InvalidateResponse,
        api::health::HealthResponse,
        models::TrailPoint,
        models::VehicleView,
        models::RouteVehicle,
        models::EtaEntry,
        models::Location,
        services::aggregate::CoverageReport,
        services::aggregate::ProviderCoverage,
        mappings::RefreshStats,
    )),
    tags(
        (name = "vehicles", description = "Vehicle trail and live route queries"),
        (name = "coverage", description = "Daily fleet coverage statistics"),
        (name = "directions", description = "OSRM directions proxy"),
        (name = "admin", description = "Mapping refresh and cache invalidation"),
        (name = "health", description = "Service health check")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info,sqlx=warn".into()),
        )
        .init();

    // Load config
    let config = Config::load("config.yaml").expect("Failed to load config");
    let timezone = config.timezone().expect("Invalid timezone in config");
    tracing::info!(timezone = %timezone, "Loaded configuration");

    // Build CORS layer based on config
    let cors_layer = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode explicitly enabled (all origins allowed) - DO NOT USE IN PRODUCTION");
        CorsLayer::permissive()
    } else if !config.cors_origins.is_empty() {
        tracing::info!(origins = ?config.cors_origins, "CORS: Restricting to configured origins");
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        panic!("CORS configuration error: Either set 'cors_origins' with allowed origins, or set 'cors_permissive: true' for development");
    };

    // Identity-mapping tables live in PostgreSQL. The pool connects lazily so a
    // mapping-store outage at boot degrades to empty mappings instead of a crash.
    let pg_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect_lazy(&config.postgres_url)
        .expect("Invalid PostgreSQL connection URL");
    let mapping_store = Arc::new(PostgresMappingStore::new(pg_pool));

    // Live vehicle-state store (Redis route hashes)
    let live_store = Arc::new(
        RedisLiveStore::connect(&config.redis_url)
            .await
            .expect("Failed to initialize Redis connection pool"),
    );

    // Historical position store (ClickHouse over HTTP)
    let history_store = Arc::new(
        ClickHouseStore::new(config.clickhouse.clone())
            .expect("Failed to initialize ClickHouse client"),
    );

    // Start the mapping refresh loop in the background
    let mapping_sync = Arc::new(MappingSync::new(
        mapping_store,
        std::time::Duration::from_secs(config.mapping_sync.refresh_interval_secs),
    ));
    let sync_handle = mapping_sync.clone();
    tokio::spawn(async move {
        sync_handle.start().await;
    });

    let service = Arc::new(VehicleService::new(
        mapping_sync.clone(),
        live_store,
        history_store,
        timezone,
        config.trail.clone(),
        config.fleet_size,
    ));

    let directions_state = api::directions::DirectionsState {
        client: reqwest::Client::new(),
        osrm_server: config.osrm_server.clone().into(),
        cache: Arc::new(cache::TtlCache::new()),
    };

    // Build the app
    let app = Router::new()
        .route("/", get(root))
        .nest("/api", api::router(service, mapping_sync, directions_state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Start server
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000")
        .await
        .expect("Failed to bind to port 3000");

    tracing::info!("Server running on http://localhost:3000");
    tracing::info!("Swagger UI: http://localhost:3000/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

async fn root() -> &'static str {
    "Fleet Trail API"
}
