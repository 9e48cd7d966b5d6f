//! Collaborative-filtering recommendation engine.
//!
//! Pure and synchronous: it reads an immutable [`RatingMatrix`] and a movie
//! catalog and never touches I/O. The request flow around it (cache, stores,
//! metadata) lives in [`crate::services::recommendations`].
//!
//! ## Scoring
//! - Similarity is cosine over raw rating vectors (unrated = 0), for both
//!   user-user and item-item. Only positive similarities contribute.
//! - Warm users get a hybrid of three predictors, each on the 1..5 scale:
//!   user-based (weighted mean over the top neighbours), item-based
//!   (weighted mean of the user's own ratings over the most similar items)
//!   and content-based (overview similarity to movies the user liked).
//!   They are blended 0.4 / 0.3 / 0.3, renormalised over the predictors that
//!   produced a score for a movie.
//! - Cold-start users (fewer than [`COLD_START_THRESHOLD`] ratings) get a
//!   damped-mean popularity ranking.
//! - Order: score desc, rating count desc, TMDB popularity desc, id asc.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        Movie, MovieId, RankingStrategy, Rating, RecommendationFilters, ScoredMovie, HIGH_SCORE,
        MAX_SCORE, MIN_SCORE,
    },
    services::content::ContentIndex,
};

/// Users with fewer ratings than this get the popularity ranking
pub const COLD_START_THRESHOLD: usize = 3;
/// Neighbours considered for user-based prediction
pub const NEIGHBOURS: usize = 5;
/// Similar items considered per rated movie
pub const SIMILAR_ITEMS: usize = 5;

const USER_WEIGHT: f64 = 0.4;
const ITEM_WEIGHT: f64 = 0.3;
const CONTENT_WEIGHT: f64 = 0.3;

/// Pseudo-count pulling sparse popularity scores towards the prior
const POPULARITY_PRIOR_WEIGHT: f64 = 3.0;
const NEUTRAL_SCORE: f64 = 3.0;

/// Sparse user x movie score table
#[derive(Debug, Default, Clone)]
pub struct RatingMatrix {
    by_user: BTreeMap<Uuid, BTreeMap<MovieId, f64>>,
    by_movie: BTreeMap<MovieId, BTreeMap<Uuid, f64>>,
    user_norms: HashMap<Uuid, f64>,
    movie_norms: HashMap<MovieId, f64>,
}

impl RatingMatrix {
    /// Builds the matrix; for duplicate (user, movie) pairs the latest rating wins
    pub fn from_ratings(ratings: &[Rating]) -> Self {
        let mut latest: BTreeMap<(Uuid, MovieId), &Rating> = BTreeMap::new();
        for rating in ratings {
            latest
                .entry((rating.user_id, rating.movie_id))
                .and_modify(|existing| {
                    if rating.rated_at >= existing.rated_at {
                        *existing = rating;
                    }
                })
                .or_insert(rating);
        }

        let mut matrix = Self::default();
        for ((user_id, movie_id), rating) in latest {
            let score = rating.score as f64;
            matrix
                .by_user
                .entry(user_id)
                .or_default()
                .insert(movie_id, score);
            matrix
                .by_movie
                .entry(movie_id)
                .or_default()
                .insert(user_id, score);
        }

        matrix.user_norms = matrix
            .by_user
            .iter()
            .map(|(id, row)| (*id, norm(row.values())))
            .collect();
        matrix.movie_norms = matrix
            .by_movie
            .iter()
            .map(|(id, column)| (*id, norm(column.values())))
            .collect();

        matrix
    }

    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }

    pub fn movie_count(&self) -> usize {
        self.by_movie.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }

    pub fn movie_ids(&self) -> impl Iterator<Item = MovieId> + '_ {
        self.by_movie.keys().copied()
    }

    pub fn user_ratings(&self, user_id: Uuid) -> Option<&BTreeMap<MovieId, f64>> {
        self.by_user.get(&user_id)
    }

    pub fn rating_count(&self, movie_id: MovieId) -> usize {
        self.by_movie.get(&movie_id).map_or(0, BTreeMap::len)
    }

    fn movie_sum(&self, movie_id: MovieId) -> f64 {
        self.by_movie
            .get(&movie_id)
            .map_or(0.0, |column| column.values().sum())
    }

    fn global_mean(&self) -> Option<f64> {
        let (sum, count) = self
            .by_user
            .values()
            .flat_map(BTreeMap::values)
            .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
        (count > 0).then(|| sum / count as f64)
    }

    /// Cosine similarity between two users' rating vectors
    pub fn user_similarity(&self, a: Uuid, b: Uuid) -> f64 {
        match (self.by_user.get(&a), self.by_user.get(&b)) {
            (Some(ra), Some(rb)) => cosine(ra, rb, self.user_norms[&a], self.user_norms[&b]),
            _ => 0.0,
        }
    }

    /// Cosine similarity between two movies' rating vectors
    pub fn item_similarity(&self, a: MovieId, b: MovieId) -> f64 {
        match (self.by_movie.get(&a), self.by_movie.get(&b)) {
            (Some(ca), Some(cb)) => cosine(ca, cb, self.movie_norms[&a], self.movie_norms[&b]),
            _ => 0.0,
        }
    }
}

fn norm<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    values.map(|v| v * v).sum::<f64>().sqrt()
}

fn cosine<K: Ord>(a: &BTreeMap<K, f64>, b: &BTreeMap<K, f64>, norm_a: f64, norm_b: f64) -> f64 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = small
        .iter()
        .filter_map(|(k, v)| large.get(k).map(|w| v * w))
        .sum();
    dot / (norm_a * norm_b)
}

/// Accumulates a similarity-weighted mean per movie
#[derive(Default)]
struct WeightedMean {
    sums: BTreeMap<MovieId, (f64, f64)>,
}

impl WeightedMean {
    fn add(&mut self, movie_id: MovieId, weight: f64, value: f64) {
        let entry = self.sums.entry(movie_id).or_insert((0.0, 0.0));
        entry.0 += weight * value;
        entry.1 += weight;
    }

    fn finish(self) -> BTreeMap<MovieId, f64> {
        self.sums
            .into_iter()
            .filter(|(_, (_, weight))| *weight > 0.0)
            .map(|(id, (sum, weight))| (id, sum / weight))
            .collect()
    }
}

/// Ranked output of one engine run
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub strategy: RankingStrategy,
    pub items: Vec<ScoredMovie>,
}

pub struct RecommendationEngine<'a> {
    matrix: &'a RatingMatrix,
    catalog: &'a HashMap<MovieId, Movie>,
    content: ContentIndex,
}

impl<'a> RecommendationEngine<'a> {
    pub fn new(matrix: &'a RatingMatrix, catalog: &'a HashMap<MovieId, Movie>) -> Self {
        // Sorted so the vocabulary and float sums are order independent
        let mut movies: Vec<&Movie> = catalog.values().collect();
        movies.sort_by_key(|m| m.id);
        let content = ContentIndex::build(movies);

        Self {
            matrix,
            catalog,
            content,
        }
    }

    /// Ranked recommendations for `user_id`
    ///
    /// Fails with `InvalidFilter` for malformed filters and
    /// `InsufficientData` when a user with enough ratings has nobody to be
    /// compared with. Filters that exclude every candidate give an empty list.
    pub fn recommend(
        &self,
        user_id: Uuid,
        filters: &RecommendationFilters,
    ) -> AppResult<Recommendation> {
        filters.validate()?;

        let empty = BTreeMap::new();
        let rated = self.matrix.user_ratings(user_id).unwrap_or(&empty);

        if rated.len() < COLD_START_THRESHOLD {
            tracing::debug!(
                user_id = %user_id,
                ratings = rated.len(),
                "Cold-start user, using popularity ranking"
            );
            return Ok(self.rank_popular(rated, filters));
        }

        if self.matrix.by_user.keys().all(|id| *id == user_id) {
            return Err(AppError::InsufficientData(
                "No other users have rated movies yet".to_string(),
            ));
        }

        let scores = self.hybrid_scores(user_id, rated);
        if scores.is_empty() {
            tracing::debug!(
                user_id = %user_id,
                "No collaborative candidates, using popularity ranking"
            );
            return Ok(self.rank_popular(rated, filters));
        }

        let items = self.rank(scores, filters);
        tracing::debug!(
            user_id = %user_id,
            results = items.len(),
            "Collaborative ranking computed"
        );

        Ok(Recommendation {
            strategy: RankingStrategy::Collaborative,
            items,
        })
    }

    /// Popularity ranking over movies `user_id` has not rated
    pub fn popular(
        &self,
        user_id: Uuid,
        filters: &RecommendationFilters,
    ) -> AppResult<Recommendation> {
        filters.validate()?;
        let empty = BTreeMap::new();
        let rated = self.matrix.user_ratings(user_id).unwrap_or(&empty);
        Ok(self.rank_popular(rated, filters))
    }

    fn rank_popular(
        &self,
        rated: &BTreeMap<MovieId, f64>,
        filters: &RecommendationFilters,
    ) -> Recommendation {
        let global_mean = self.matrix.global_mean();

        let candidates: BTreeSet<MovieId> = self
            .matrix
            .movie_ids()
            .chain(self.catalog.keys().copied())
            .filter(|id| !rated.contains_key(id))
            .collect();

        let scores: BTreeMap<MovieId, f64> = candidates
            .into_iter()
            .map(|movie_id| {
                let prior = self
                    .catalog
                    .get(&movie_id)
                    .and_then(|m| m.vote_average)
                    .filter(|v| *v > 0.0)
                    .map(|v| v / 2.0)
                    .or(global_mean)
                    .unwrap_or(NEUTRAL_SCORE)
                    .clamp(MIN_SCORE as f64, MAX_SCORE as f64);
                let n = self.matrix.rating_count(movie_id) as f64;
                let sum = self.matrix.movie_sum(movie_id);
                let score = (POPULARITY_PRIOR_WEIGHT * prior + sum) / (POPULARITY_PRIOR_WEIGHT + n);
                (movie_id, score)
            })
            .collect();

        Recommendation {
            strategy: RankingStrategy::Popularity,
            items: self.rank(scores, filters),
        }
    }

    fn hybrid_scores(&self, user_id: Uuid, rated: &BTreeMap<MovieId, f64>) -> BTreeMap<MovieId, f64> {
        let components = [
            (USER_WEIGHT, self.user_based(user_id, rated)),
            (ITEM_WEIGHT, self.item_based(rated)),
            (CONTENT_WEIGHT, self.content_based(rated)),
        ];

        let mut blended: BTreeMap<MovieId, (f64, f64)> = BTreeMap::new();
        for (weight, scores) in &components {
            for (movie_id, score) in scores {
                let entry = blended.entry(*movie_id).or_insert((0.0, 0.0));
                entry.0 += weight * score;
                entry.1 += weight;
            }
        }

        blended
            .into_iter()
            .map(|(id, (sum, weight))| (id, sum / weight))
            .collect()
    }

    fn user_based(&self, user_id: Uuid, rated: &BTreeMap<MovieId, f64>) -> BTreeMap<MovieId, f64> {
        let mut neighbours: Vec<(Uuid, f64)> = self
            .matrix
            .by_user
            .keys()
            .filter(|other| **other != user_id)
            .map(|other| (*other, self.matrix.user_similarity(user_id, *other)))
            .filter(|(_, sim)| *sim > 0.0)
            .collect();
        neighbours.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        neighbours.truncate(NEIGHBOURS);

        let mut predictions = WeightedMean::default();
        for (neighbour, sim) in neighbours {
            for (movie_id, score) in &self.matrix.by_user[&neighbour] {
                if !rated.contains_key(movie_id) {
                    predictions.add(*movie_id, sim, *score);
                }
            }
        }
        predictions.finish()
    }

    fn item_based(&self, rated: &BTreeMap<MovieId, f64>) -> BTreeMap<MovieId, f64> {
        let mut predictions = WeightedMean::default();

        for (rated_movie, score) in rated {
            let mut similar: Vec<(MovieId, f64)> = self
                .matrix
                .movie_ids()
                .filter(|candidate| !rated.contains_key(candidate))
                .map(|candidate| (candidate, self.matrix.item_similarity(*rated_movie, candidate)))
                .filter(|(_, sim)| *sim > 0.0)
                .collect();
            similar.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            similar.truncate(SIMILAR_ITEMS);

            for (candidate, sim) in similar {
                predictions.add(candidate, sim, *score);
            }
        }
        predictions.finish()
    }

    fn content_based(&self, rated: &BTreeMap<MovieId, f64>) -> BTreeMap<MovieId, f64> {
        let mut predictions: BTreeMap<MovieId, f64> = BTreeMap::new();

        for (liked, score) in rated.iter().filter(|(_, s)| **s >= HIGH_SCORE as f64) {
            for (candidate, _) in
                self.content
                    .most_similar(*liked, SIMILAR_ITEMS, |id| rated.contains_key(&id))
            {
                let entry = predictions.entry(candidate).or_insert(*score);
                *entry = entry.max(*score);
            }
        }
        predictions
    }

    fn rank(&self, scores: BTreeMap<MovieId, f64>, filters: &RecommendationFilters) -> Vec<ScoredMovie> {
        let mut items: Vec<ScoredMovie> = scores
            .into_iter()
            .filter(|(movie_id, score)| {
                filters.matches_score(*score) && filters.matches_movie(self.catalog.get(movie_id))
            })
            .map(|(movie_id, score)| ScoredMovie { movie_id, score })
            .collect();

        items.sort_by(|a, b| self.compare(a, b));
        items.truncate(filters.limit);
        items
    }

    fn compare(&self, a: &ScoredMovie, b: &ScoredMovie) -> Ordering {
        let popularity = |id: MovieId| {
            self.catalog
                .get(&id)
                .and_then(|m| m.popularity)
                .unwrap_or(0.0)
        };

        b.score
            .total_cmp(&a.score)
            .then_with(|| {
                self.matrix
                    .rating_count(b.movie_id)
                    .cmp(&self.matrix.rating_count(a.movie_id))
            })
            .then_with(|| popularity(b.movie_id).total_cmp(&popularity(a.movie_id)))
            .then_with(|| a.movie_id.cmp(&b.movie_id))
    }
}
