use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};

use std::sync::Arc;

use rhythm_core::{Error as RhythmError, Post};
use rhythm_feed::{spawn_feed, FeedCapabilities, FeedEvent, FeedHandle};

use crate::{
    error::Result,
    payload::{AutoLoadRequest, FeedResponse, FilterPatch, NewFeedRequest, SearchRequest, SentinelRequest},
    state::AppState,
    util::timeout,
};

pub fn feed_router() -> Router<AppState> {
    Router::new()
        .route("/feed", post(add_feed))
        .route("/feed/:id", get(get_feed).delete(delete_feed))
        .route("/feed/:id/more", post(load_more))
        .route("/feed/:id/sentinel", post(sentinel))
        .route("/feed/:id/filter", post(change_filter))
        .route("/feed/:id/search", post(search))
        .route("/feed/:id/auto_load", post(set_auto_load))
        .route("/feed/:id/post/:post_id", get(open_post))
}

async fn feed(app_state: &AppState, id: u64) -> Result<Arc<FeedHandle>> {
    let feed = app_state
        .feeds
        .get(id)
        .await
        .ok_or(RhythmError::ObjectNotFound(format!("feed {}", id)))?;
    Ok(feed)
}

/// Send the events, then answer with the state once they have played out.
async fn dispatch(app_state: &AppState, id: u64, events: Vec<FeedEvent>) -> Result<Json<FeedResponse>> {
    let feed = feed(app_state, id).await?;
    for event in events {
        feed.send(event).await?;
    }
    let snapshot = timeout(feed.settled()).await?;
    Ok(Json(FeedResponse { id, snapshot }))
}

async fn add_feed(State(app_state): State<AppState>, Json(request): Json<NewFeedRequest>) -> Result<Json<FeedResponse>> {
    let mut caps = FeedCapabilities::for_kind(request.kind);
    if let Some(supports_tags) = request.supports_tags {
        caps.supports_tags = supports_tags;
    }

    let feed = spawn_feed(app_state.backend.clone(), caps, request.filter, request.auto_load);
    let (id, _) = app_state.feeds.insert(feed).await;
    tracing::info!("Mounted {} feed {}", request.kind, id);

    dispatch(&app_state, id, vec![]).await
}

async fn get_feed(State(app_state): State<AppState>, Path(id): Path<u64>) -> Result<Json<FeedResponse>> {
    let snapshot = feed(&app_state, id).await?.snapshot();
    Ok(Json(FeedResponse { id, snapshot }))
}

async fn delete_feed(State(app_state): State<AppState>, Path(id): Path<u64>) -> Result<()> {
    app_state
        .feeds
        .remove(id)
        .await
        .ok_or(RhythmError::ObjectNotFound(format!("feed {}", id)))?;
    tracing::info!("Unmounted feed {}", id);
    Ok(())
}

async fn load_more(State(app_state): State<AppState>, Path(id): Path<u64>) -> Result<Json<FeedResponse>> {
    dispatch(&app_state, id, vec![FeedEvent::LoadMore]).await
}

async fn sentinel(
    State(app_state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<SentinelRequest>,
) -> Result<Json<FeedResponse>> {
    let event = FeedEvent::SentinelVisible { epoch: request.epoch };
    dispatch(&app_state, id, vec![event]).await
}

async fn change_filter(
    State(app_state): State<AppState>,
    Path(id): Path<u64>,
    Json(patch): Json<FilterPatch>,
) -> Result<Json<FeedResponse>> {
    dispatch(&app_state, id, patch.into_events()).await
}

async fn search(
    State(app_state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<FeedResponse>> {
    dispatch(&app_state, id, vec![FeedEvent::SearchInput(request.text)]).await
}

async fn set_auto_load(
    State(app_state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<AutoLoadRequest>,
) -> Result<Json<FeedResponse>> {
    dispatch(&app_state, id, vec![FeedEvent::SetAutoLoad(request.enabled)]).await
}

async fn open_post(
    State(app_state): State<AppState>,
    Path((id, post_id)): Path<(u64, String)>,
) -> Result<Json<Post>> {
    let feed = feed(&app_state, id).await?;
    let post = timeout(feed.open_post(&post_id)).await?;
    Ok(Json(post))
}
