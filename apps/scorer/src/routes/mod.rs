pub mod health;

use axum::{routing::get, Router};

use crate::run::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Scheduler trigger; both verbs so plain cron pingers work
        .route(
            "/api/v1/notes/score",
            get(handlers::handle_score_run).post(handlers::handle_score_run),
        )
        .with_state(state)
}
