//! API handlers for the auth service

pub mod auth;
pub mod health;

pub use auth::*;
pub use health::health_check;

// Re-export the extractors from middleware for handler use
pub use crate::middleware::auth::{AuthenticatedUser, BearerSession};
