//! Route definitions for the auth API

mod auth;

use axum::{routing::get, Router};

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

pub use auth::auth_routes;

/// The full application router with its middleware stack
///
/// CORS and HSTS depend on deployment settings and are layered on in `main`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(auth_routes())
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
}
