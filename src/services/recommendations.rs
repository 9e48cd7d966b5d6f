use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::{Cache, CacheKey, RatingStore},
    error::{AppError, AppResult},
    models::{
        catalog_from, Movie, MovieId, RankingStrategy, Rating, RecommendationFilters,
        RecommendationResult, RecommendedMovie, ScoredMovie,
    },
    services::{
        engine::{RatingMatrix, RecommendationEngine, COLD_START_THRESHOLD},
        providers::{fetch_details_batch, MetadataProvider},
    },
};

/// How long the last good result survives for stale serving
const LAST_GOOD_TTL: u64 = 7 * 86400;
/// Version used before a user's first rating write
const INITIAL_VERSION: &str = "0";

const COLD_START_MESSAGE: &str =
    "Rate a few more movies to get personal picks. Showing popular movies for now.";
const NO_PEERS_MESSAGE: &str =
    "Nobody else has rated movies yet. Showing popular movies for now.";

/// Recommendation request flow
///
/// Cache lookup, rating store read, catalog assembly, engine run, metadata
/// enrichment and write-through. Rating writes go through here too so they
/// can invalidate cached results.
#[derive(Clone)]
pub struct RecommendationService {
    ratings: Arc<dyn RatingStore>,
    metadata: Arc<dyn MetadataProvider>,
    cache: Cache,
    cache_ttl: u64,
}

impl RecommendationService {
    pub fn new(
        ratings: Arc<dyn RatingStore>,
        metadata: Arc<dyn MetadataProvider>,
        cache: Cache,
        cache_ttl: u64,
    ) -> Self {
        Self {
            ratings,
            metadata,
            cache,
            cache_ttl,
        }
    }

    /// Ranked, enriched recommendations for `user_id`
    pub async fn recommend(
        &self,
        user_id: Uuid,
        filters: &RecommendationFilters,
    ) -> AppResult<RecommendationResult> {
        filters.validate()?;

        let canonical = filters.canonical();
        // Without a readable version no cached entry can be trusted
        let key = self
            .ratings_version(user_id)
            .await
            .map(|version| CacheKey::Recommendations {
                user_id,
                version,
                filters: canonical.clone(),
            });

        if let Some(key) = &key {
            match self.cache.get_from_cache::<RecommendationResult>(key).await {
                Ok(Some(hit)) => {
                    tracing::debug!(user_id = %user_id, key = %key, "Recommendation cache hit");
                    return Ok(hit);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, key = %key, "Recommendation cache read failed"),
            }
        }

        let ratings = match self.ratings.all_ratings().await {
            Ok(ratings) => ratings,
            Err(e) => return self.last_good(user_id, canonical, e).await,
        };

        let matrix = RatingMatrix::from_ratings(&ratings);
        let catalog = self.build_catalog(&matrix).await;
        let engine = RecommendationEngine::new(&matrix, &catalog);

        let (ranking, message) = match engine.recommend(user_id, filters) {
            Ok(ranking) => {
                let cold_start = matrix
                    .user_ratings(user_id)
                    .map_or(0, |rated| rated.len())
                    < COLD_START_THRESHOLD;
                let message = (ranking.strategy == RankingStrategy::Popularity && cold_start)
                    .then(|| COLD_START_MESSAGE.to_string());
                (ranking, message)
            }
            Err(AppError::InsufficientData(reason)) => {
                tracing::info!(user_id = %user_id, reason = %reason, "Falling back to popularity ranking");
                (engine.popular(user_id, filters)?, Some(NO_PEERS_MESSAGE.to_string()))
            }
            Err(e) => return Err(e),
        };

        let items = self.enrich(ranking.items, &catalog).await;

        let result = RecommendationResult {
            user_id,
            strategy: ranking.strategy,
            items,
            message,
            generated_at: Utc::now(),
            stale: false,
        };

        tracing::info!(
            user_id = %user_id,
            strategy = ?result.strategy,
            results = result.items.len(),
            "Recommendations computed"
        );

        if let Some(key) = &key {
            self.cache.set_in_background(key, &result, self.cache_ttl);
        }
        self.cache.set_in_background(
            &CacheKey::LastRecommendations {
                user_id,
                filters: canonical,
            },
            &result,
            LAST_GOOD_TTL,
        );

        Ok(result)
    }

    /// Upserts a rating and invalidates the user's cached recommendations
    pub async fn record_rating(&self, user_id: Uuid, movie_id: MovieId, score: i16) -> AppResult<Rating> {
        let rating = Rating::new(user_id, movie_id, score)?;
        let stored = self.ratings.upsert(&rating).await?;
        self.bump_version(user_id).await;

        tracing::info!(user_id = %user_id, movie_id, score, "Rating recorded");
        Ok(stored)
    }

    pub async fn remove_rating(&self, user_id: Uuid, movie_id: MovieId) -> AppResult<()> {
        if !self.ratings.delete(user_id, movie_id).await? {
            return Err(AppError::NotFound(format!("Rating for movie {}", movie_id)));
        }
        self.bump_version(user_id).await;

        tracing::info!(user_id = %user_id, movie_id, "Rating removed");
        Ok(())
    }

    /// The user's own ratings, newest first
    pub async fn ratings_for(&self, user_id: Uuid) -> AppResult<Vec<Rating>> {
        self.ratings.user_ratings(user_id).await
    }

    /// Current ratings version, `None` when it cannot be read
    async fn ratings_version(&self, user_id: Uuid) -> Option<String> {
        match self
            .cache
            .get_from_cache::<String>(&CacheKey::RatingsVersion(user_id))
            .await
        {
            Ok(Some(version)) => Some(version),
            Ok(None) => Some(INITIAL_VERSION.to_string()),
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Ratings version read failed, bypassing recommendation cache"
                );
                None
            }
        }
    }

    /// Points the user's recommendation keys at a fresh version
    ///
    /// Outlives every recommendation entry so an expired version can never
    /// resurrect results cached under the initial one.
    async fn bump_version(&self, user_id: Uuid) {
        let ttl = self.cache_ttl.max(LAST_GOOD_TTL);
        let version = Uuid::new_v4().to_string();
        if let Err(e) = self
            .cache
            .set(&CacheKey::RatingsVersion(user_id), &version, ttl)
            .await
        {
            tracing::error!(
                user_id = %user_id,
                error = %e,
                "Failed to invalidate cached recommendations"
            );
        }
    }

    async fn last_good(
        &self,
        user_id: Uuid,
        filters: String,
        cause: AppError,
    ) -> AppResult<RecommendationResult> {
        tracing::error!(user_id = %user_id, error = %cause, "Rating store read failed");

        let key = CacheKey::LastRecommendations { user_id, filters };
        match self.cache.get_from_cache::<RecommendationResult>(&key).await {
            Ok(Some(mut previous)) => {
                tracing::warn!(user_id = %user_id, "Serving last good recommendations");
                previous.stale = true;
                Ok(previous)
            }
            Ok(None) | Err(_) => Err(AppError::ServiceUnavailable(
                "Ratings are temporarily unavailable".to_string(),
            )),
        }
    }

    /// Metadata for every rated movie plus the first popular page
    async fn build_catalog(&self, matrix: &RatingMatrix) -> HashMap<MovieId, Movie> {
        let rated: Vec<MovieId> = matrix.movie_ids().collect();
        let (details, popular) = tokio::join!(
            fetch_details_batch(Arc::clone(&self.metadata), rated),
            self.metadata.popular_movies(1)
        );

        let mut catalog = match popular {
            Ok(movies) => catalog_from(movies),
            Err(e) => {
                tracing::warn!(error = %e, "Popular movies unavailable, catalog limited to rated movies");
                HashMap::new()
            }
        };
        // Details carry the full genre list, so they win over list entries
        catalog.extend(details);

        tracing::debug!(
            rated_movies = matrix.movie_count(),
            catalog_size = catalog.len(),
            "Catalog assembled"
        );
        catalog
    }

    async fn enrich(
        &self,
        items: Vec<ScoredMovie>,
        catalog: &HashMap<MovieId, Movie>,
    ) -> Vec<RecommendedMovie> {
        let missing: Vec<MovieId> = items
            .iter()
            .map(|item| item.movie_id)
            .filter(|id| !catalog.contains_key(id))
            .collect();

        let fetched = if missing.is_empty() {
            HashMap::new()
        } else {
            fetch_details_batch(Arc::clone(&self.metadata), missing).await
        };

        items
            .into_iter()
            .map(|item| RecommendedMovie {
                movie_id: item.movie_id,
                score: item.score,
                movie: catalog
                    .get(&item.movie_id)
                    .or_else(|| fetched.get(&item.movie_id))
                    .cloned(),
            })
            .collect()
    }
}
