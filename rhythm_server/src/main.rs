mod error;
mod payload;
mod router;
mod state;
mod util;

use axum::Router;
use dotenvy::dotenv;
use tower_http::trace::TraceLayer;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use std::env;
use std::sync::Arc;

use rhythm_feed::{engagement::EngagementService, home::HomeFeed, FeedRegistry, RemoteBackend};

use crate::state::AppState;

#[tokio::main]
async fn main() {
    dotenv().ok();

    // 1. Initialize logger
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::DEBUG.into())
        .from_env()
        .unwrap()
        .add_directive("hyper::proto=info".parse().unwrap())
        .add_directive("hyper::client=info".parse().unwrap())
        .add_directive("reqwest=info".parse().unwrap());
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();

    // 2. Initialize backend
    let backend_url = env::var("BACKEND_URL").expect("BACKEND_URL must be set");
    let anon_key = env::var("BACKEND_ANON_KEY").expect("BACKEND_ANON_KEY must be set");
    let backend = RemoteBackend::new(&backend_url, &anon_key).expect("BACKEND_URL must be a valid URL");
    let backend = Arc::new(backend);

    // 3. Setup state and router
    let app_state = AppState {
        backend: backend.clone(),
        feeds: Arc::new(FeedRegistry::new()),
        engagement: Arc::new(EngagementService::new()),
        home: Arc::new(HomeFeed::new(backend)),
    };
    app_state.feeds.clone().spawn_sweeper();

    let app = Router::new()
        .merge(router::feed::feed_router())
        .merge(router::post::post_router())
        .merge(router::profile::profile_router())
        .merge(router::home::home_router())
        .merge(router::search::search_router())
        .merge(router::submission::submission_router())
        .layer(TraceLayer::new_for_http().on_request(()))
        .with_state(app_state);

    // 4. Start server
    let addr = env::var("SERVER_ADDRESS").expect("SERVER_ADDRESS must be set");
    tracing::info!("Server starting at {}", addr);
    axum::Server::bind(&addr.parse().unwrap())
        .serve(app.into_make_service())
        .await
        .unwrap();
}
