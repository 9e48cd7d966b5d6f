use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub mod user;

pub use user::User;

/// TMDB movie identifier
pub type MovieId = i64;

/// Lowest score a user can give
pub const MIN_SCORE: i16 = 1;
/// Highest score a user can give
pub const MAX_SCORE: i16 = 5;
/// Scores at or above this count as "liked"
pub const HIGH_SCORE: i16 = 4;

const POSTER_BASE_URL: &str = "https://image.tmdb.org/t/p/w500";

/// A user's score for one movie. Unique per (user, movie).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Rating {
    pub user_id: Uuid,
    pub movie_id: MovieId,
    pub score: i16,
    pub rated_at: DateTime<Utc>,
}

impl Rating {
    /// Creates a rating stamped with the current time, validating the score
    pub fn new(user_id: Uuid, movie_id: MovieId, score: i16) -> AppResult<Self> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(AppError::InvalidInput(format!(
                "Score must be between {} and {}",
                MIN_SCORE, MAX_SCORE
            )));
        }
        if movie_id <= 0 {
            return Err(AppError::InvalidInput(
                "Movie id must be positive".to_string(),
            ));
        }

        Ok(Self {
            user_id,
            movie_id,
            score,
            rated_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

/// Descriptive movie attributes, as fetched from the metadata service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    pub overview: Option<String>,
    pub genre_ids: Vec<i64>,
    pub release_year: Option<i32>,
    /// TMDB community average on a 0..10 scale
    pub vote_average: Option<f64>,
    pub popularity: Option<f64>,
    pub poster_path: Option<String>,
}

impl Movie {
    pub fn poster_url(&self) -> Option<String> {
        self.poster_path
            .as_ref()
            .map(|path| format!("{}{}", POSTER_BASE_URL, path))
    }

    pub fn has_any_genre(&self, genres: &BTreeSet<i64>) -> bool {
        self.genre_ids.iter().any(|g| genres.contains(g))
    }
}

/// Constraints a caller can put on recommended or browsed movies
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationFilters {
    /// A movie matches when it has at least one of these genres
    #[serde(default)]
    pub genres: BTreeSet<i64>,
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub year_from: Option<i32>,
    #[serde(default)]
    pub year_to: Option<i32>,
    /// Case-insensitive title substring
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

pub const DEFAULT_LIMIT: usize = 12;
pub const MAX_LIMIT: usize = 50;

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl Default for RecommendationFilters {
    fn default() -> Self {
        Self {
            genres: BTreeSet::new(),
            min_score: None,
            year_from: None,
            year_to: None,
            query: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl RecommendationFilters {
    /// Rejects malformed constraints. Constraints that merely match nothing are valid.
    pub fn validate(&self) -> AppResult<()> {
        if let Some(min) = self.min_score {
            if !min.is_finite() || min < MIN_SCORE as f64 || min > MAX_SCORE as f64 {
                return Err(AppError::InvalidFilter(format!(
                    "min_score must be between {} and {}",
                    MIN_SCORE, MAX_SCORE
                )));
            }
        }
        if let (Some(from), Some(to)) = (self.year_from, self.year_to) {
            if from > to {
                return Err(AppError::InvalidFilter(
                    "year_from must not be after year_to".to_string(),
                ));
            }
        }
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(AppError::InvalidFilter(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }
        Ok(())
    }

    /// True when filtering needs movie metadata
    pub fn needs_metadata(&self) -> bool {
        !self.genres.is_empty()
            || self.year_from.is_some()
            || self.year_to.is_some()
            || self.normalized_query().is_some()
    }

    pub fn year_range(&self) -> Option<(i32, i32)> {
        match (self.year_from, self.year_to) {
            (None, None) => None,
            (from, to) => Some((from.unwrap_or(i32::MIN), to.unwrap_or(i32::MAX))),
        }
    }

    fn normalized_query(&self) -> Option<String> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase)
    }

    /// Checks genre, year and title constraints against movie metadata
    pub fn matches_movie(&self, movie: Option<&Movie>) -> bool {
        if !self.needs_metadata() {
            return true;
        }
        let Some(movie) = movie else {
            return false;
        };

        if !self.genres.is_empty() && !movie.has_any_genre(&self.genres) {
            return false;
        }

        if let Some((from, to)) = self.year_range() {
            match movie.release_year {
                Some(year) if year >= from && year <= to => {}
                _ => return false,
            }
        }

        if let Some(query) = self.normalized_query() {
            if !movie.title.to_lowercase().contains(&query) {
                return false;
            }
        }

        true
    }

    pub fn matches_score(&self, score: f64) -> bool {
        self.min_score.map_or(true, |min| score >= min)
    }

    /// Stable textual form used in cache keys; `min_score` is written exactly
    pub fn canonical(&self) -> String {
        let genres: Vec<String> = self.genres.iter().map(|g| g.to_string()).collect();
        let opt = |v: Option<String>| v.unwrap_or_default();
        format!(
            "g={};min={};from={};to={};q={};n={}",
            genres.join(","),
            opt(self.min_score.map(|m| m.to_string())),
            opt(self.year_from.map(|y| y.to_string())),
            opt(self.year_to.map(|y| y.to_string())),
            opt(self.normalized_query()),
            self.limit
        )
    }
}

/// Engine output: one candidate and its predicted preference
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoredMovie {
    pub movie_id: MovieId,
    pub score: f64,
}

/// How a recommendation list was produced
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RankingStrategy {
    Collaborative,
    Popularity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendedMovie {
    pub movie_id: MovieId,
    pub score: f64,
    /// Missing when metadata could not be fetched
    pub movie: Option<Movie>,
}

/// Ranked recommendations for one user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationResult {
    pub user_id: Uuid,
    pub strategy: RankingStrategy,
    pub items: Vec<RecommendedMovie>,
    pub message: Option<String>,
    pub generated_at: DateTime<Utc>,
    /// Set when served from the last good result because ratings were unreadable
    #[serde(default)]
    pub stale: bool,
}

/// One of the user's own ratings with the movie's metadata when available
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatedMovie {
    pub movie_id: MovieId,
    pub score: i16,
    pub rated_at: DateTime<Utc>,
    pub movie: Option<Movie>,
}

// ============================================================================
// TMDB API Types
// ============================================================================

/// Movie entry as returned by list endpoints (/movie/popular, /search/movie)
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovie {
    pub id: MovieId,
    pub title: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<i64>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub poster_path: Option<String>,
}

/// Response from GET /movie/{id}
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovieDetails {
    pub id: MovieId,
    pub title: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub poster_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbPage<T> {
    pub page: u32,
    pub results: Vec<T>,
    #[serde(default)]
    pub total_pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbGenreList {
    pub genres: Vec<Genre>,
}

/// Extracts the year from a "YYYY-MM-DD" date; TMDB sends "" for unknown dates
fn release_year(date: Option<&str>) -> Option<i32> {
    date.and_then(|d| d.get(..4)).and_then(|y| y.parse().ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<TmdbMovie> for Movie {
    fn from(m: TmdbMovie) -> Self {
        Movie {
            id: m.id,
            release_year: release_year(m.release_date.as_deref()),
            title: m.title,
            overview: non_empty(m.overview),
            genre_ids: m.genre_ids,
            vote_average: m.vote_average,
            popularity: m.popularity,
            poster_path: non_empty(m.poster_path),
        }
    }
}

impl From<TmdbMovieDetails> for Movie {
    fn from(m: TmdbMovieDetails) -> Self {
        Movie {
            id: m.id,
            release_year: release_year(m.release_date.as_deref()),
            title: m.title,
            overview: non_empty(m.overview),
            genre_ids: m.genres.iter().map(|g| g.id).collect(),
            vote_average: m.vote_average,
            popularity: m.popularity,
            poster_path: non_empty(m.poster_path),
        }
    }
}

/// Index movies by id
pub fn catalog_from(movies: impl IntoIterator<Item = Movie>) -> HashMap<MovieId, Movie> {
    movies.into_iter().map(|m| (m.id, m)).collect()
}
