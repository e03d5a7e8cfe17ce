//! API router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Health and status
        .route("/health", get(handlers::health_check))
        // Sessions
        .route("/sessions", post(handlers::open_session))
        .route("/sessions/:id", get(handlers::get_session))
        .route("/sessions/:id/cancel", post(handlers::cancel_session))
        // Listings
        .route("/listings", post(handlers::create_listing))
        .route("/listings/:subject_id", get(handlers::get_listing))
        .route("/listings/:subject_id", delete(handlers::delete_listing))
        // Keypairs
        .route("/keys", post(handlers::generate_keys))
        // Local ledger simulation
        .route("/dev/transfers", post(handlers::record_transfer));

    let mut app = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app.with_state(state)
}
