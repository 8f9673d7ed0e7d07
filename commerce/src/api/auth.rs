use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;

use crate::services::auth::{LoginRequest, ProfileUpdate, RegisterRequest};

use super::extract::{ApiJson, AuthUser};
use super::{created, ok, ok_with_message, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/profile", get(profile).put(update_profile))
}

async fn register(State(state): State<AppState>, ApiJson(request): ApiJson<RegisterRequest>) -> ApiResult {
    let session = state.auth.register(request, Utc::now()).await?;
    Ok(created(session, "Registration successful"))
}

async fn login(State(state): State<AppState>, ApiJson(request): ApiJson<LoginRequest>) -> ApiResult {
    let session = state.auth.login(request, Utc::now()).await?;
    Ok(ok_with_message(session, "Login successful"))
}

async fn profile(AuthUser(user): AuthUser) -> ApiResult {
    Ok(ok(user))
}

async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> ApiResult {
    let user = state.auth.update_profile(user, update, Utc::now()).await?;
    Ok(ok_with_message(user, "Profile updated"))
}
