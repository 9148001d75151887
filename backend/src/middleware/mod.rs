//! Middleware for the auth API
//!
//! This module provides middleware for request tracing, security headers,
//! and bearer authentication.

pub mod auth;
mod security;
mod tracing;

pub use auth::{AuthenticatedUser, BearerSession};
pub use security::{hsts_header, security_headers};
pub use self::tracing::{client_ip, request_tracing};
