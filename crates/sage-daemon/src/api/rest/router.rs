//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Decisions and execution
        .route("/decisions", post(handlers::evaluate_decisions))
        .route("/actions/execute", post(handlers::execute_action))
        // Situations
        .route(
            "/situations/:entity_type/:entity_id",
            get(handlers::get_situation),
        )
        .route(
            "/situations/:entity_type/:entity_id/transitions",
            post(handlers::transition_situation),
        )
        // Audit history
        .route(
            "/audit/:entity_type/:entity_id",
            get(handlers::entity_history),
        );

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}
