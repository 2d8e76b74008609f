use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Control-surface routes, mounted under `/dirwatcher`.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/results", post(handlers::results_handler))
        .route("/task", post(handlers::task_handler))
        .route("/interval", post(handlers::interval_handler))
        .route("/magicword", post(handlers::magic_word_handler))
        .route("/directory", post(handlers::directory_handler))
        .route("/status", get(handlers::status_handler));

    Router::new()
        .nest("/dirwatcher", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
