//! HTTP API route definitions.

use axum::{routing::get, Json, Router};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use super::docs::ApiDoc;
use super::handlers::{data, health, prometheus, ready, AppState};

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Data endpoint
        .route("/api/data", get(data))
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Observability
        .route("/metrics", get(prometheus))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
