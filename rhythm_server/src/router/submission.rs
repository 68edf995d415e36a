use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
    routing::{get, patch, post},
    Router,
};

use rhythm_core::Post;
use rhythm_feed::submission::{self, edit_post, my_posts, submit_post, toggle_hidden, MyPosts, PostEdit, Submission};

use crate::{
    error::Result,
    payload::{DeletedResponse, TabQuery},
    state::AppState,
    util::{require_session, timeout},
};

/// Submitting posts and managing your own. Every route needs a signed in user.
pub fn submission_router() -> Router<AppState> {
    Router::new()
        .route("/posts", post(submit))
        .route("/me/posts", get(list))
        .route("/me/posts/:id", patch(edit).delete(delete))
        .route("/me/posts/:id/hide", post(hide))
}

async fn submit(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<Submission>,
) -> Result<Json<Post>> {
    let (backend, user) = require_session(&app_state, &headers).await?;
    let post = timeout(submit_post(&backend, &user, &request)).await?;
    Ok(Json(post))
}

async fn list(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TabQuery>,
) -> Result<Json<MyPosts>> {
    let tab = query.kind()?;
    let (backend, user) = require_session(&app_state, &headers).await?;
    let posts = timeout(my_posts(&backend, &user, tab)).await?;
    Ok(Json(posts))
}

async fn edit(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<PostEdit>,
) -> Result<Json<Post>> {
    let (backend, user) = require_session(&app_state, &headers).await?;
    let post = timeout(edit_post(&backend, &user, &id, &request)).await?;
    Ok(Json(post))
}

async fn delete(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>> {
    let (backend, user) = require_session(&app_state, &headers).await?;
    timeout(submission::delete_post(&backend, &user, &id)).await?;
    Ok(Json(DeletedResponse {
        post_id: id,
        deleted: true,
    }))
}

async fn hide(State(app_state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Result<Json<Post>> {
    let (backend, user) = require_session(&app_state, &headers).await?;
    let post = timeout(toggle_hidden(&backend, &user, &id)).await?;
    Ok(Json(post))
}
