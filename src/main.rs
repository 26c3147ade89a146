use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipfeed_server::cache::{CacheTier, MemoryTier, RedisTier, TieredCache};
use clipfeed_server::db::{PgStore, StoreGateway};
use clipfeed_server::relations::{MemoryRelationStore, RedisRelationStore, RelationStore};
use clipfeed_server::{router, App, AppState, Config};

/// How long entries stay in the in-process tier in front of Redis
const LOCAL_TIER_TTL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipfeed_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Clipfeed Server...");

    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(
        "Environment: {}, Server: {}",
        config.environment,
        config.server_address()
    );

    let store = PgStore::connect(&config.database_url).await?;

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(store.pool()).await?;
    tracing::info!("Migrations complete");

    let store: Arc<dyn StoreGateway> = Arc::new(store);
    let local: Arc<dyn CacheTier> = Arc::new(MemoryTier::new(config.cache.local_cache_capacity));

    let tier: Arc<dyn CacheTier>;
    let relations: Arc<dyn RelationStore>;
    match &config.redis_url {
        Some(url) => {
            let remote = RedisTier::connect(url).await?;
            relations = Arc::new(RedisRelationStore::new(remote.connection()));
            tier = Arc::new(TieredCache::new(local, Arc::new(remote), LOCAL_TIER_TTL));
            tracing::info!("Using Redis behind the in-process cache tier");
        }
        None => {
            tracing::warn!("REDIS_URL not set, using in-process cache and relation store only");
            relations = Arc::new(MemoryRelationStore::new());
            tier = local;
        }
    }

    let app = App::build(
        Arc::clone(&store),
        tier,
        relations,
        &config.cache,
        config.credential_pepper.clone(),
    )
    .await?;
    let scheduler = app.scheduler.clone();

    // Configure CORS
    let origins = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid allowed origin: {}", origin);
                None
            }
        })
        .collect::<Vec<_>>();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any);

    let app = router(AppState::new(app, store))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Let pending second deletes run before exiting
    scheduler.drain().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
