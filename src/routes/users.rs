use axum::{extract::State, http::StatusCode, Extension};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::CurrentUser,
    models::User,
    routes::{extract::Json, AppState},
    services::AuthSession,
};

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub display_name: String,
    pub password: String,
}

/// POST /api/v1/users
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<Credentials>,
) -> AppResult<(StatusCode, Json<AuthSession>)> {
    let session = state
        .auth
        .signup(&credentials.display_name, &credentials.password)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// POST /api/v1/sessions
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<Credentials>,
) -> AppResult<Json<AuthSession>> {
    let session = state
        .auth
        .login(&credentials.display_name, &credentials.password)
        .await?;
    Ok(Json(session))
}

/// DELETE /api/v1/sessions/current
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> AppResult<StatusCode> {
    state.auth.logout(&current.token).await?;
    tracing::info!(user_id = %current.user.id, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/me
pub async fn me(Extension(current): Extension<CurrentUser>) -> Json<User> {
    Json(current.user)
}
