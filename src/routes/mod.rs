use axum::{
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    middleware::{make_span_with_request_id, request_id_middleware, require_session},
    services::{AuthService, MovieService, RecommendationService},
};

pub mod extract;
pub mod filters;
pub mod movies;
pub mod ratings;
pub mod recommendations;
pub mod users;

/// Services shared by every handler
pub struct AppState {
    pub auth: AuthService,
    pub recommendations: RecommendationService,
    pub movies: MovieService,
}

/// Creates the application router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes(state))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
}

/// API routes under /api/v1
fn api_routes(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/users", post(users::signup))
        .route("/sessions", post(users::login));

    let authenticated = Router::new()
        .route("/sessions/current", delete(users::logout))
        .route("/me", get(users::me))
        .route("/ratings", put(ratings::rate).get(ratings::list))
        .route("/ratings/favorites", get(ratings::favorites))
        .route("/ratings/:movie_id", delete(ratings::remove))
        .route("/recommendations", get(recommendations::recommend))
        .route("/movies/popular", get(movies::popular))
        .route("/movies/search", get(movies::search))
        .route("/movies/:id", get(movies::details))
        .route("/genres", get(movies::genres))
        .route_layer(from_fn_with_state(Arc::clone(&state), require_session));

    public.merge(authenticated).with_state(state)
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
