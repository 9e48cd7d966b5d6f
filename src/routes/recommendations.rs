use axum::{extract::State, Extension};
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::CurrentUser,
    models::RecommendationResult,
    routes::{
        extract::{Json, Query},
        filters::FilterQuery,
        AppState,
    },
};

/// GET /api/v1/recommendations
pub async fn recommend(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<FilterQuery>,
) -> AppResult<Json<RecommendationResult>> {
    let filters = query.into_filters()?;
    let result = state
        .recommendations
        .recommend(current.user.id, &filters)
        .await?;
    Ok(Json(result))
}
