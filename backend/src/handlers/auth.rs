//! Authentication HTTP handlers
//!
//! Thin adapters from JSON requests onto [`AuthService`](crate::auth::AuthService).

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Json,
};
use validator::Validate;

use super::{AuthenticatedUser, BearerSession};
use crate::error::ApiError;
use crate::middleware::client_ip;
use crate::models::{
    AuthResult, LogoutAllResponse, NonceRequest, NonceResponse, RefreshTokenRequest,
    SessionMetadata, VerifyRequest,
};
use crate::state::AppState;

/// POST /auth/nonce - Issue a login nonce
pub async fn request_nonce(
    State(state): State<AppState>,
    Json(req): Json<NonceRequest>,
) -> Result<Json<NonceResponse>, ApiError> {
    req.validate()?;

    let nonce = state
        .auth_service
        .get_nonce(&req.account_id, &req.chain_id, &req.domain)
        .await?;

    Ok(Json(NonceResponse { nonce }))
}

/// POST /auth/verify - Verify a signed SIWE message and issue tokens
pub async fn verify_siwe(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<AuthResult>, ApiError> {
    req.validate()?;

    let metadata = SessionMetadata {
        device_id: req.device_id,
        ip_address: client_ip(&headers),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.chars().take(512).collect()),
        collection_intent_context: req.collection_intent_context,
    };

    let result = state
        .auth_service
        .verify_siwe(&req.account_id, &req.message, &req.signature, metadata)
        .await?;

    Ok(Json(result))
}

/// POST /auth/refresh - Rotate the refresh token and issue a new access token
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<Json<AuthResult>, ApiError> {
    let result = state.auth_service.refresh(&req.refresh_token).await?;
    Ok(Json(result))
}

/// POST /auth/logout - Revoke the session behind the bearer token
///
/// Retrying with the same token after the session is gone still succeeds.
pub async fn logout(
    State(state): State<AppState>,
    bearer: BearerSession,
) -> Result<StatusCode, ApiError> {
    tracing::debug!(user_id = %bearer.user_id, "Logout requested");
    state
        .auth_service
        .logout(&bearer.session_id.to_string())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /auth/logout/token - Revoke the session holding a refresh token
pub async fn logout_by_refresh_token(
    State(state): State<AppState>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .auth_service
        .logout_by_refresh_token(&req.refresh_token)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /auth/logout-all - Revoke all sessions for current user
pub async fn logout_all(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<LogoutAllResponse>, ApiError> {
    let revoked_sessions = state.auth_service.logout_all(user.user_id).await?;
    Ok(Json(LogoutAllResponse { revoked_sessions }))
}
