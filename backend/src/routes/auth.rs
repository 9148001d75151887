//! Authentication routes

use axum::{routing::post, Router};

use crate::handlers::auth;
use crate::state::AppState;

/// Create authentication routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/nonce", post(auth::request_nonce))
        .route("/auth/verify", post(auth::verify_siwe))
        .route("/auth/refresh", post(auth::refresh_token))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/logout/token", post(auth::logout_by_refresh_token))
        .route("/auth/logout-all", post(auth::logout_all))
}
