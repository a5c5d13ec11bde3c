//! Diner API - HTTP front-end for the restaurant directory
//!
//! The router is exposed as a library so integration tests can drive it
//! without binding a socket.

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod metrics_middleware;
pub mod state;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::get_configuration))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/restaurants", post(handlers::create_restaurant))
        .route("/restaurants/rating", post(handlers::rate_restaurant))
        .route(
            "/restaurants/{name}",
            get(handlers::get_restaurant).delete(handlers::delete_restaurant),
        )
        .route("/restaurants/cuisine/{cuisine}", get(handlers::top_by_cuisine))
        .route("/restaurants/region/{region}", get(handlers::top_by_region))
        .route(
            "/restaurants/region/{region}/cuisine/{cuisine}",
            get(handlers::top_by_region_and_cuisine),
        )
        .layer(middleware::from_fn(metrics_middleware::metrics_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
