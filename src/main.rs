use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cinematch_api::{
    config::{CacheBackendKind, Config, StorageBackend},
    db::{
        cache::{create_redis_client, CacheBackend, MemoryBackend, RedisBackend},
        create_pool, Cache, MemoryRatingStore, MemoryUserStore, PgRatingStore, PgUserStore,
        RatingStore, UserStore,
    },
    routes::{create_router, AppState},
    services::{
        providers::{MetadataProvider, RetryPolicy, TmdbProvider},
        AuthService, MovieService, PasswordHasher, RecommendationService,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinematch_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        storage = ?config.storage,
        cache = ?config.cache_backend,
        "Configuration loaded"
    );

    let backend: Arc<dyn CacheBackend> = match config.cache_backend {
        CacheBackendKind::Redis => Arc::new(RedisBackend::new(create_redis_client(
            &config.redis_url,
        )?)),
        CacheBackendKind::Memory => Arc::new(MemoryBackend::new()),
    };
    let (cache, cache_writer) = Cache::new(backend).await;

    let (ratings, users): (Arc<dyn RatingStore>, Arc<dyn UserStore>) = match config.storage {
        StorageBackend::Postgres => {
            let pool = create_pool(&config.database_url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            (
                Arc::new(PgRatingStore::new(pool.clone())),
                Arc::new(PgUserStore::new(pool)),
            )
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; users and ratings are lost on restart");
            (
                Arc::new(MemoryRatingStore::new()),
                Arc::new(MemoryUserStore::new()),
            )
        }
    };

    let retry = RetryPolicy::new(
        config.metadata_max_retries,
        Duration::from_millis(config.metadata_retry_backoff_ms),
    );
    let metadata: Arc<dyn MetadataProvider> = Arc::new(TmdbProvider::new(
        cache.clone(),
        config.tmdb_api_key.clone(),
        config.tmdb_api_url.clone(),
        retry,
    )?);

    let state = Arc::new(AppState {
        auth: AuthService::new(
            users,
            cache.clone(),
            PasswordHasher::new(),
            config.session_ttl,
        ),
        recommendations: RecommendationService::new(
            Arc::clone(&ratings),
            Arc::clone(&metadata),
            cache,
            config.recommendation_cache_ttl,
        ),
        movies: MovieService::new(ratings, metadata),
    });

    let app = create_router(state).layer(CorsLayer::permissive());

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!(address = %address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cache_writer.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
