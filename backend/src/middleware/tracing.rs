//! Request tracing middleware

use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Best-effort client address from proxy headers
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.trim().to_string())
        })
}

/// Middleware for logging request information with timing
///
/// Only method and path are logged; bodies carry signatures and tokens.
pub async fn request_tracing(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client_ip = client_ip(request.headers());

    let start = Instant::now();
    tracing::debug!(method = %method, path = %path, client_ip = ?client_ip, "Request started");

    let response = next.run(request).await;

    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        tracing::error!(method = %method, path = %path, status, duration_ms, "Request failed");
    } else if response.status().is_client_error() {
        tracing::warn!(method = %method, path = %path, status, duration_ms, "Request rejected");
    } else {
        tracing::info!(method = %method, path = %path, status, duration_ms, "Request completed");
    }

    response
}
