//! Catalog browsing: popular, search, favourites, details and genres.

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::{
    db::RatingStore,
    error::AppResult,
    models::{Genre, Movie, MovieId, RatedMovie, RecommendationFilters, HIGH_SCORE},
    services::providers::{fetch_details_batch, MetadataProvider},
};

/// Movies shown per browse request
pub const BROWSE_RESULTS: usize = 8;
/// Upper bound on popular pages walked to fill one filtered list
pub const MAX_POPULAR_PAGES: u32 = 50;

#[derive(Clone)]
pub struct MovieService {
    ratings: Arc<dyn RatingStore>,
    metadata: Arc<dyn MetadataProvider>,
}

impl MovieService {
    pub fn new(ratings: Arc<dyn RatingStore>, metadata: Arc<dyn MetadataProvider>) -> Self {
        Self { ratings, metadata }
    }

    /// Popular movies matching `filters` that `user_id` has not rated yet
    ///
    /// Walks popular pages until enough matches are found. A failure on the
    /// first page is returned; later failures end the walk with what was
    /// collected.
    pub async fn popular(&self, user_id: Uuid, filters: &RecommendationFilters) -> AppResult<Vec<Movie>> {
        filters.validate()?;
        let rated: HashSet<MovieId> = self
            .ratings
            .user_ratings(user_id)
            .await?
            .into_iter()
            .map(|r| r.movie_id)
            .collect();

        let mut found = Vec::with_capacity(BROWSE_RESULTS);
        let mut seen = HashSet::new();

        for page in 1..=MAX_POPULAR_PAGES {
            let movies = match self.metadata.popular_movies(page).await {
                Ok(movies) => movies,
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    tracing::warn!(page, error = %e, "Stopping popular walk early");
                    break;
                }
            };
            if movies.is_empty() {
                break;
            }

            found.extend(movies.into_iter().filter(|m| {
                !rated.contains(&m.id) && seen.insert(m.id) && filters.matches_movie(Some(m))
            }));

            if found.len() >= BROWSE_RESULTS {
                break;
            }
        }

        found.truncate(BROWSE_RESULTS);
        tracing::debug!(user_id = %user_id, results = found.len(), "Popular movies browsed");
        Ok(found)
    }

    /// Title search; the year range is sent upstream, genres are filtered here
    pub async fn search(&self, query: &str, filters: &RecommendationFilters) -> AppResult<Vec<Movie>> {
        filters.validate()?;
        let movies = self
            .metadata
            .search_movies(query, filters.year_range())
            .await?;

        let local = RecommendationFilters {
            query: None,
            ..filters.clone()
        };

        Ok(movies
            .into_iter()
            .take(BROWSE_RESULTS)
            .filter(|m| local.matches_movie(Some(m)))
            .collect())
    }

    /// The user's ratings of 4 and above, newest first
    ///
    /// Entries whose metadata cannot be fetched are kept unless a filter needs it.
    pub async fn favorites(
        &self,
        user_id: Uuid,
        filters: &RecommendationFilters,
    ) -> AppResult<Vec<RatedMovie>> {
        filters.validate()?;
        let liked: Vec<_> = self
            .ratings
            .user_ratings(user_id)
            .await?
            .into_iter()
            .filter(|r| r.score >= HIGH_SCORE)
            .collect();

        let ids = liked.iter().map(|r| r.movie_id).collect();
        let mut details = fetch_details_batch(Arc::clone(&self.metadata), ids).await;

        Ok(liked
            .into_iter()
            .map(|r| RatedMovie {
                movie_id: r.movie_id,
                score: r.score,
                rated_at: r.rated_at,
                movie: details.remove(&r.movie_id),
            })
            .filter(|rated| filters.matches_movie(rated.movie.as_ref()))
            .collect())
    }

    pub async fn details(&self, movie_id: MovieId) -> AppResult<Movie> {
        self.metadata.movie_details(movie_id).await
    }

    pub async fn genres(&self) -> AppResult<Vec<Genre>> {
        self.metadata.genres().await
    }
}
