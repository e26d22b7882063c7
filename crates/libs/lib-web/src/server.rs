//! # Server Setup
//!
//! Wires every collaborator built in `lib-core` into an [`AppState`], builds
//! the router, and drives startup/shutdown (§4.8, §5, §9).

use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::{get, post};
use axum::Router;
use lib_core::cache::{Cache, RedisCache};
use lib_core::model::store::{create_pool, DurableStore, PgDurableStore};
use lib_core::oracle::{AlchemyOracleClient, PriceOracle};
use lib_core::queue::{
    batch_worker::BatchWorker, price_worker::PriceWorker, run_worker_pool, JobQueue,
    QUEUE_BATCH_PROCESSING, QUEUE_PRICE_PROCESSING,
};
use lib_core::{Config, LifecycleManager, ResolutionPipeline};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::middleware::{log_requests, stamp_req};

/// Shared application state. Every field is already internally `Arc`/`Clone`
/// cheap, so the struct itself derives `Clone` rather than wrapping itself
/// in an `Arc` (§9: no shared mutable singletons — collaborators are handed
/// to every component at construction time).
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ResolutionPipeline>,
    pub store: Arc<dyn DurableStore>,
    pub cache: Arc<dyn Cache>,
    pub oracle: Arc<dyn PriceOracle>,
    pub queue: JobQueue,
    pub config: Arc<Config>,
}

impl FromRef<AppState> for Arc<Config> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for JobQueue {
    fn from_ref(state: &AppState) -> Self {
        state.queue.clone()
    }
}

/// Initialize tracing, configuration, every `lib-core` collaborator, the
/// worker pools, and the lifecycle manager's cron tasks, then serve until a
/// shutdown signal arrives (§5: drain queues, stop cron, close connections).
pub async fn start_server() -> anyhow::Result<()> {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::try_new(&log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    dotenvy::dotenv().ok();

    info!("loading configuration");
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;
    lib_core::init_config(config.clone()).map_err(|e| anyhow::anyhow!(e))?;
    let config = Arc::new(config);

    info!("connecting to postgres");
    let pool = create_pool(&config.database_url).await?;

    info!("running migrations");
    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new("./migrations")).await?;
    migrator.run(&pool).await?;

    info!("connecting to redis");
    let cache: Arc<dyn Cache> = Arc::new(RedisCache::new(&config.redis_url).await?);
    let queue = JobQueue::new(pool.clone());
    let store: Arc<dyn DurableStore> = Arc::new(PgDurableStore::new(pool));
    let oracle: Arc<dyn PriceOracle> = Arc::new(AlchemyOracleClient::new(
        config.oracle.api_key.clone(),
        config.oracle.request_timeout,
    ));

    let pipeline = Arc::new(ResolutionPipeline::new(
        cache.clone(),
        store.clone(),
        oracle.clone(),
        queue.clone(),
        config.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let price_worker = Arc::new(PriceWorker::new(
        store.clone(),
        cache.clone(),
        oracle.clone(),
        queue.clone(),
        config.clone(),
    ));
    let price_worker_handle = tokio::spawn(run_worker_pool(
        queue.clone(),
        QUEUE_PRICE_PROCESSING,
        config.queue.price_processing.concurrency,
        config.queue.price_processing.base_backoff_ms,
        price_worker,
        shutdown_rx.clone(),
    ));

    let batch_worker = Arc::new(BatchWorker::new(store.clone(), oracle.clone()));
    let batch_worker_handle = tokio::spawn(run_worker_pool(
        queue.clone(),
        QUEUE_BATCH_PROCESSING,
        config.queue.batch_processing.concurrency,
        config.queue.batch_processing.base_backoff_ms,
        batch_worker,
        shutdown_rx.clone(),
    ));

    let lifecycle = Arc::new(LifecycleManager::new(
        store.clone(),
        cache.clone(),
        oracle.clone(),
        queue.clone(),
        config.clone(),
    ));
    let lifecycle_handles = lifecycle.spawn_all(shutdown_rx.clone());

    let state = AppState {
        pipeline,
        store,
        cache,
        oracle,
        queue,
        config: config.clone(),
    };

    let app = create_router(state, &config.allowed_origins);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("listening on {}", config.bind_address);

    let serve = axum::serve(listener, app.into_make_service());
    tokio::select! {
        result = serve => {
            result?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, draining queues and cron tasks");
            let _ = shutdown_tx.send(true);

            let drain = futures::future::join_all(
                std::iter::once(price_worker_handle)
                    .chain(std::iter::once(batch_worker_handle))
                    .chain(lifecycle_handles),
            );
            if tokio::time::timeout(std::time::Duration::from_secs(30), drain)
                .await
                .is_err()
            {
                tracing::warn!("shutdown drain timed out after 30s, exiting anyway");
            }
        }
    }

    Ok(())
}

fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    use axum::http::{HeaderValue, Method};
    use tower_http::cors::CorsLayer;

    let cors = if allowed_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    };

    Router::new()
        .route("/api/tokens", post(handlers::tokens::resolve_price))
        .route(
            "/api/batch/historical",
            post(handlers::batch::enqueue_historical),
        )
        .route("/api/queue/status", get(handlers::queue::queue_status))
        .route("/health", get(handlers::health::health))
        .with_state(state)
        .layer(axum::middleware::from_fn(stamp_req))
        .layer(axum::middleware::from_fn(log_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
