//! Campaign Mapper
//!
//! Main entry point for the keyword set allocation server.

use campaign_mapper::{
    allocation::AllocationEngine,
    local_mirror::{LedgerRepository, MirrorRepository, MySqlStore},
    session_driver::{HttpSessionFactory, NoDelay, Pacer, RandomPacer},
    state::{AppConfig, AppState},
    web_api,
};
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campaign_mapper=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Campaign Mapper v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    let limits = config.limits()?;
    let settings = config.driver_settings()?;
    tracing::info!(
        remote_base_url = %settings.base_url,
        target_location = %config.target_location,
        max_campaigns_per_account = limits.max_campaigns_per_account,
        max_adgroups_per_campaign = limits.max_adgroups_per_campaign,
        max_keywords_per_adgroup = limits.max_keywords_per_adgroup,
        pacing_enabled = config.pacing_enabled,
        "Configuration loaded"
    );

    // Create database pool
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await?;

    tracing::info!("Database connected");

    let store = Arc::new(MySqlStore::new(pool));
    if config.install_schema {
        store.install().await?;
        tracing::info!("Schema installed");
    }

    let pacer: Arc<dyn Pacer> = match config.pacing_bounds() {
        Some((min, max)) => Arc::new(RandomPacer::new(min, max)),
        None => {
            tracing::warn!("Request pacing disabled");
            Arc::new(NoDelay)
        }
    };
    let sessions = Arc::new(HttpSessionFactory::new(
        settings,
        pacer,
        config.http_timeout(),
    ));

    let mirror: Arc<dyn MirrorRepository> = store.clone();
    let ledger: Arc<dyn LedgerRepository> = store;
    let engine = AllocationEngine::new(mirror, ledger, sessions, limits);
    tracing::info!("AllocationEngine initialized");

    let state = AppState::new(config, engine);

    let app = web_api::create_router(state.clone())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
