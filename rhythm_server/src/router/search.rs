use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};

use rhythm_feed::search::{directory, search_all, Directory, SearchResults};
use rhythm_feed::user::{user_page, UserPage};

use crate::{
    error::Result,
    payload::{SearchQuery, TabQuery},
    state::AppState,
    util::timeout,
};

pub fn search_router() -> Router<AppState> {
    Router::new()
        .route("/search", get(search))
        .route("/people", get(people))
        .route("/user/:username", get(user))
}

async fn search(State(app_state): State<AppState>, Query(query): Query<SearchQuery>) -> Result<Json<SearchResults>> {
    let results = timeout(search_all(app_state.backend.as_ref(), &query.q)).await?;
    Ok(Json(results))
}

async fn people(State(app_state): State<AppState>, Query(query): Query<SearchQuery>) -> Result<Json<Directory>> {
    let people = timeout(directory(app_state.backend.as_ref(), &query.q)).await?;
    Ok(Json(people))
}

async fn user(
    State(app_state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<TabQuery>,
) -> Result<Json<UserPage>> {
    let tab = query.kind()?;
    let page = timeout(user_page(app_state.backend.as_ref(), &username, tab)).await?;
    Ok(Json(page))
}
