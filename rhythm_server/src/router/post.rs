use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
    routing::{get, post},
    Router,
};

use std::collections::HashMap;

use rhythm_core::social::{CommentView, Engagement, Reaction};
use rhythm_feed::RemoteBackend;

use crate::{
    error::Result,
    payload::{NewCommentRequest, ToggleResponse},
    state::AppState,
    util::{require_session, session, timeout},
};

pub fn post_router() -> Router<AppState> {
    Router::new()
        .route("/engagement", get(get_engagement))
        .route("/post/:id/like", post(toggle_like))
        .route("/post/:id/save", post(toggle_save))
        .route("/post/:id/comments", get(get_comments).post(add_comment))
}

/// `?ids=1,2,3`
async fn get_engagement(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Engagement>>> {
    let ids = params
        .get("ids")
        .map(|ids| {
            ids.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let session = session(&app_state, &headers).await?;
    let engagement = match &session {
        Some((backend, user)) => app_state.engagement.engagement(backend, Some(user), &ids),
        None => app_state.engagement.engagement(app_state.backend.as_ref(), None, &ids),
    };
    Ok(Json(timeout(engagement).await?))
}

async fn toggle(app_state: &AppState, headers: &HeaderMap, post_id: String, reaction: Reaction) -> Result<Json<ToggleResponse>> {
    let (backend, user) = require_session(app_state, headers).await?;
    let active = timeout(app_state.engagement.toggle(&backend, Some(&user), &post_id, reaction)).await?;
    Ok(Json(ToggleResponse { post_id, active }))
}

async fn toggle_like(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ToggleResponse>> {
    toggle(&app_state, &headers, id, Reaction::Like).await
}

async fn toggle_save(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ToggleResponse>> {
    toggle(&app_state, &headers, id, Reaction::Save).await
}

async fn get_comments(State(app_state): State<AppState>, Path(id): Path<String>) -> Result<Json<Vec<CommentView>>> {
    let backend: &RemoteBackend = &app_state.backend;
    let comments = timeout(app_state.engagement.comments(backend, &id)).await?;
    Ok(Json(comments))
}

async fn add_comment(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<NewCommentRequest>,
) -> Result<Json<Vec<CommentView>>> {
    let (backend, user) = require_session(&app_state, &headers).await?;
    timeout(app_state.engagement.post_comment(&backend, Some(&user), &id, &request.body)).await?;

    let comments = timeout(app_state.engagement.comments(&backend, &id)).await?;
    Ok(Json(comments))
}
