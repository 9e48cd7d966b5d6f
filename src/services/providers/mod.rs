/// Movie metadata provider abstraction
///
/// The recommendation flow only needs descriptive attributes (title, genres,
/// overview, poster, community rating). Providers expose them behind one
/// trait so the HTTP client can be swapped or mocked.
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{Genre, Movie, MovieId},
};

pub mod tmdb;

pub use tmdb::TmdbProvider;

/// Trait for movie metadata providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Full details for one movie
    ///
    /// Fails with `NotFound` for unknown ids and `ServiceUnavailable` when the
    /// upstream service cannot be reached.
    async fn movie_details(&self, movie_id: MovieId) -> AppResult<Movie>;

    /// One page (1-based) of currently popular movies
    async fn popular_movies(&self, page: u32) -> AppResult<Vec<Movie>>;

    /// Title search, optionally limited to an inclusive release-year range
    async fn search_movies(
        &self,
        query: &str,
        year_range: Option<(i32, i32)>,
    ) -> AppResult<Vec<Movie>>;

    async fn genres(&self) -> AppResult<Vec<Genre>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Fetches details for many movies in parallel
///
/// Failed lookups are logged and left out; the caller decides how to
/// degrade when a movie has no metadata.
pub async fn fetch_details_batch(
    provider: Arc<dyn MetadataProvider>,
    movie_ids: Vec<MovieId>,
) -> HashMap<MovieId, Movie> {
    let mut tasks = Vec::with_capacity(movie_ids.len());

    for movie_id in movie_ids {
        let provider = Arc::clone(&provider);
        let task = tokio::spawn(async move { (movie_id, provider.movie_details(movie_id).await) });
        tasks.push(task);
    }

    let mut movies = HashMap::new();
    let mut error_count = 0usize;

    for task in tasks {
        match task.await {
            Ok((_, Ok(movie))) => {
                movies.insert(movie.id, movie);
            }
            Ok((movie_id, Err(e))) => {
                tracing::warn!(movie_id, error = %e, "Metadata fetch failed for movie");
                error_count += 1;
            }
            Err(e) => {
                tracing::error!(error = %e, "Task join error");
                error_count += 1;
            }
        }
    }

    if error_count > 0 {
        tracing::warn!(
            success_count = movies.len(),
            error_count,
            provider = provider.name(),
            "Partial metadata fetch failure"
        );
    }

    movies
}

/// Bounded retry policy for transient upstream failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff * n`
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(200))
    }
}

/// Runs `call` until it succeeds, fails permanently, or retries run out
///
/// Only errors for which [`AppError::is_transient`] holds are retried.
pub async fn with_retries<T, F, Fut>(policy: RetryPolicy, operation: &str, mut call: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                tracing::warn!(
                    operation,
                    attempt,
                    max_retries = policy.max_retries,
                    error = %e,
                    "Transient upstream failure, retrying"
                );
                tokio::time::sleep(policy.backoff * attempt).await;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::error!(operation, attempts = attempt + 1, error = %e, "Upstream call failed");
                    return Err(AppError::ServiceUnavailable(format!(
                        "{} failed after {} attempts: {}",
                        operation,
                        attempt + 1,
                        e
                    )));
                }
                return Err(e);
            }
        }
    }
}
