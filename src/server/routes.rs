use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::*;
use super::metrics::metrics_handler;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/_api/execute", post(execute_statement))
        .route("/_api/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
