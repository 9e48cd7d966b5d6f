use axum::{extract::State, Extension};
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    middleware::CurrentUser,
    models::{Genre, Movie, MovieId},
    routes::{
        extract::{Json, Path, Query},
        filters::FilterQuery,
        AppState,
    },
};

/// GET /api/v1/movies/popular
pub async fn popular(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<FilterQuery>,
) -> AppResult<Json<Vec<Movie>>> {
    let filters = query.into_filters()?;
    Ok(Json(state.movies.popular(current.user.id, &filters).await?))
}

/// GET /api/v1/movies/search
///
/// `q` is the title to search for; the other filter parameters narrow the results.
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FilterQuery>,
) -> AppResult<Json<Vec<Movie>>> {
    let filters = query.into_filters()?;
    let title = filters
        .query
        .clone()
        .ok_or_else(|| AppError::InvalidInput("Query parameter 'q' is required".to_string()))?;
    Ok(Json(state.movies.search(&title, &filters).await?))
}

/// GET /api/v1/movies/:id
pub async fn details(
    State(state): State<Arc<AppState>>,
    Path(movie_id): Path<MovieId>,
) -> AppResult<Json<Movie>> {
    Ok(Json(state.movies.details(movie_id).await?))
}

/// GET /api/v1/genres
pub async fn genres(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Genre>>> {
    Ok(Json(state.movies.genres().await?))
}
