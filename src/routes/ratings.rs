use axum::{extract::State, http::StatusCode, Extension};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::CurrentUser,
    models::{MovieId, RatedMovie, Rating},
    routes::{
        extract::{Json, Path, Query},
        filters::FilterQuery,
        AppState,
    },
};

#[derive(Debug, Deserialize)]
pub struct RateMovie {
    pub movie_id: MovieId,
    pub score: i16,
}

/// PUT /api/v1/ratings
pub async fn rate(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<RateMovie>,
) -> AppResult<Json<Rating>> {
    let rating = state
        .recommendations
        .record_rating(current.user.id, request.movie_id, request.score)
        .await?;
    Ok(Json(rating))
}

/// GET /api/v1/ratings
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<Json<Vec<Rating>>> {
    Ok(Json(state.recommendations.ratings_for(current.user.id).await?))
}

/// DELETE /api/v1/ratings/:movie_id
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(movie_id): Path<MovieId>,
) -> AppResult<StatusCode> {
    state
        .recommendations
        .remove_rating(current.user.id, movie_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/ratings/favorites
pub async fn favorites(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<FilterQuery>,
) -> AppResult<Json<Vec<RatedMovie>>> {
    let filters = query.into_filters()?;
    Ok(Json(state.movies.favorites(current.user.id, &filters).await?))
}
