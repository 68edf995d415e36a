use axum::{extract::State, response::Json, routing::get, Router};

use rhythm_feed::home::HomeCard;

use crate::state::AppState;

pub fn home_router() -> Router<AppState> {
    Router::new().route("/home", get(get_home))
}

async fn get_home(State(app_state): State<AppState>) -> Json<Vec<HomeCard>> {
    Json(app_state.home.cards().await)
}
