//! HTTP route table for the v1 and v2 inference protocols.

pub mod health;
pub mod repository;
pub mod v1;
pub mod v2;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{middleware, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::logging::request_logger;
use crate::state::AppState;

/// Build the full route table served by the primary listener.
pub fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    let routes = Router::new()
        .merge(health::router())
        .merge(health::v2_router())
        .merge(v1::router())
        .merge(v2::router())
        .merge(repository::router());

    finish(routes, state, max_body_bytes)
}

/// Build the v2-only route table served by the secondary listener.
pub fn v2_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    let routes = Router::new()
        .merge(health::v2_router())
        .merge(v2::router())
        .merge(repository::router());

    finish(routes, state, max_body_bytes)
}

fn finish(routes: Router<Arc<AppState>>, state: Arc<AppState>, max_body_bytes: usize) -> Router {
    routes
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::from_fn(request_logger))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
