use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::backend::CacheBackend;
use crate::error::AppError;
use crate::error::AppResult;
use crate::models::MovieId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Ranked list for one user, ratings version and filter set
    Recommendations {
        user_id: Uuid,
        version: String,
        filters: String,
    },
    /// Last successfully computed list, kept past invalidation
    LastRecommendations { user_id: Uuid, filters: String },
    /// Bumped on every rating write
    RatingsVersion(Uuid),
    MovieDetails(MovieId),
    PopularMovies(u32),
    MovieSearch {
        query: String,
        year_range: Option<(i32, i32)>,
    },
    Genres,
    Session(String),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Recommendations {
                user_id,
                version,
                filters,
            } => write!(f, "recs:{}:{}:{}", user_id, version, filters),
            CacheKey::LastRecommendations { user_id, filters } => {
                write!(f, "recs_last:{}:{}", user_id, filters)
            }
            CacheKey::RatingsVersion(user_id) => write!(f, "ratings_ver:{}", user_id),
            CacheKey::MovieDetails(id) => write!(f, "movie:{}", id),
            CacheKey::PopularMovies(page) => write!(f, "popular:{}", page),
            CacheKey::MovieSearch { query, year_range } => match year_range {
                Some((from, to)) => write!(
                    f,
                    "search:{}:{}-{}",
                    query.trim().to_lowercase(),
                    from,
                    to
                ),
                None => write!(f, "search:{}", query.trim().to_lowercase()),
            },
            CacheKey::Genres => write!(f, "genres"),
            CacheKey::Session(token) => write!(f, "session:{}", token),
        }
    }
}

/// Message for asynchronous cache writes
struct CacheWriteMessage {
    key: String,
    value: String,
    ttl: u64,
}

/// JSON cache on top of a key/value backend
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    write_tx: mpsc::UnboundedSender<CacheWriteMessage>,
}

/// Handle for gracefully shutting down the cache writer
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl CacheWriterHandle {
    /// Signals the writer task and waits until pending writes are flushed
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Cache writer task panicked");
        }
    }
}

impl Cache {
    /// Creates a new Cache instance with an async write background task
    ///
    /// This spawns a background task that processes cache writes asynchronously,
    /// so write-through never blocks a response.
    pub async fn new(backend: Arc<dyn CacheBackend>) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let writer_backend = Arc::clone(&backend);
        let task = tokio::spawn(async move {
            Self::cache_writer_task(writer_backend, write_rx, shutdown_rx).await;
        });

        tracing::info!(backend = backend.name(), "Cache initialized");

        let cache = Self { backend, write_tx };
        let handle = CacheWriterHandle { shutdown_tx, task };

        (cache, handle)
    }

    /// Background task that processes cache write messages
    ///
    /// On shutdown the channel is closed and whatever is still queued gets
    /// written before the task exits.
    async fn cache_writer_task(
        backend: Arc<dyn CacheBackend>,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = backend.set(&msg.key, &msg.value, msg.ttl).await {
                        tracing::error!(error = %e, key = %msg.key, "Failed to write to cache");
                    }
                }
                _ = shutdown_rx.recv() => {
                    write_rx.close();
                    let mut flushed = 0usize;
                    while let Some(msg) = write_rx.recv().await {
                        if let Err(e) = backend.set(&msg.key, &msg.value, msg.ttl).await {
                            tracing::error!(error = %e, "Failed to flush cache write during shutdown");
                        }
                        flushed += 1;
                    }

                    tracing::info!(flushed, "Cache writer task stopped");
                    break;
                }
            }
        }
    }

    /// Retrieves and deserializes a value, `None` on a miss
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let cached = self.backend.get(&key.to_string()).await?;

        match cached {
            Some(json) => {
                let data = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Stores a value and waits for the backend to acknowledge it
    ///
    /// Use for data that the very next request must observe (sessions,
    /// invalidation markers).
    pub async fn set<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) -> AppResult<()> {
        let json = serde_json::to_string(value)
            .map_err(|e| AppError::Internal(format!("Cache serialization error: {}", e)))?;
        self.backend.set(&key.to_string(), &json, ttl).await
    }

    /// Stores a value asynchronously without blocking
    ///
    /// The value is serialized here and handed to the background writer;
    /// failures are only logged.
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        let msg = CacheWriteMessage {
            key: key.to_string(),
            value: json,
            ttl,
        };

        if let Err(e) = self.write_tx.send(msg) {
            tracing::error!(error = %e, "Failed to send cache write message");
        }
    }

    pub async fn delete(&self, key: &CacheKey) -> AppResult<()> {
        self.backend.delete(&key.to_string()).await
    }
}
