//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::auth::AuthService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    /// Absent when running on the in-memory stores
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn new(auth_service: Arc<AuthService>, db_pool: Option<PgPool>) -> Self {
        Self {
            auth_service,
            db_pool,
        }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}
