use axum::{extract::State, http::HeaderMap, response::Json, routing::post, Router};

use rhythm_core::social::Profile;
use rhythm_feed::profile::{ensure_profile, update_profile, ProfileUpdate};

use crate::{
    error::Result,
    state::AppState,
    util::{require_session, timeout},
};

pub fn profile_router() -> Router<AppState> {
    Router::new()
        .route("/profile/ensure", post(ensure))
        .route("/profile", post(update))
}

/// Called after every sign in; creates the profile on the first one.
async fn ensure(State(app_state): State<AppState>, headers: HeaderMap) -> Result<Json<Profile>> {
    let (backend, user) = require_session(&app_state, &headers).await?;
    let profile = timeout(ensure_profile(&backend, &user)).await?;
    Ok(Json(profile))
}

async fn update(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ProfileUpdate>,
) -> Result<Json<Profile>> {
    let (backend, user) = require_session(&app_state, &headers).await?;
    let profile = timeout(update_profile(&backend, &user, &request)).await?;
    Ok(Json(profile))
}
