use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_handler))
        .route(
            "/slack/commands",
            post(handlers::command::slash_command_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
