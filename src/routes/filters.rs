use serde::Deserialize;
use std::collections::BTreeSet;

use crate::{
    error::{AppError, AppResult},
    models::{RecommendationFilters, DEFAULT_LIMIT},
};

/// Query string shared by recommendation and browse endpoints,
/// e.g. `?genres=28,12&min_score=3.5&year_from=1990&q=alien&limit=10`
#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    /// Comma-separated genre ids
    pub genres: Option<String>,
    pub min_score: Option<f64>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub q: Option<String>,
    pub limit: Option<usize>,
}

impl FilterQuery {
    pub fn into_filters(self) -> AppResult<RecommendationFilters> {
        let genres = match self.genres.as_deref() {
            None => BTreeSet::new(),
            Some(raw) => parse_genres(raw)?,
        };

        let filters = RecommendationFilters {
            genres,
            min_score: self.min_score,
            year_from: self.year_from,
            year_to: self.year_to,
            query: self.q.filter(|q| !q.trim().is_empty()),
            limit: self.limit.unwrap_or(DEFAULT_LIMIT),
        };
        filters.validate()?;
        Ok(filters)
    }
}

fn parse_genres(raw: &str) -> AppResult<BTreeSet<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .map_err(|_| AppError::InvalidFilter(format!("Invalid genre id '{}'", part)))
        })
        .collect()
}
