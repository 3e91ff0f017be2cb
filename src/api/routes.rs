use axum::{
    routing::{get, post},
    Router,
};

use crate::api::handlers::{invoke, AppState};
use crate::api::middleware::with_request_tracing;

/// Create router with application state
pub fn create_router_with_state(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health_check))
        .route("/invoke/ingest", post(invoke::ingest))
        .route("/invoke/sweep", post(invoke::sweep))
        .with_state(state);

    with_request_tracing(router)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
