mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::engine::Assistant;

pub fn create_router(assistant: Arc<Assistant>) -> Router {
    let api = Router::new()
        // Turns
        .route("/turns", post(handlers::process_turn))
        // Sessions
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/expire", post(handlers::expire_sessions))
        .route(
            "/sessions/{id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/{id}/answer", post(handlers::answer))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(assistant)
}
