//! Authentication middleware
//!
//! Extractors for bearer access tokens. [`AuthenticatedUser`] only accepts a
//! token while the session it was minted for is still live, so logout takes
//! effect before the token's own expiry. [`BearerSession`] checks the token
//! alone and backs logout.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{AuthError, AuthService};
use crate::error::GENERIC_AUTH_FAILURE;

/// Authenticated caller extracted from a bearer access token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub address: String,
    pub chain_id: String,
}

#[derive(Debug, Serialize)]
struct Rejection {
    error: RejectionDetails,
}

#[derive(Debug, Serialize)]
struct RejectionDetails {
    code: &'static str,
    message: &'static str,
}

fn reject(status: StatusCode, code: &'static str, message: &'static str) -> Response {
    (
        status,
        Json(Rejection {
            error: RejectionDetails { code, message },
        }),
    )
        .into_response()
}

/// Session named by a bearer access token whose signature, issuer and expiry
/// check out. The session itself may already be revoked, which keeps logout
/// retryable.
#[derive(Debug, Clone)]
pub struct BearerSession {
    pub user_id: Uuid,
    pub session_id: Uuid,
}

async fn bearer_token<S: Send + Sync>(parts: &mut Parts, state: &S) -> Result<String, Response> {
    let TypedHeader(Authorization(bearer)) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .map_err(|_| {
                reject(
                    StatusCode::UNAUTHORIZED,
                    "MISSING_TOKEN",
                    "Authorization header with Bearer token required",
                )
            })?;
    Ok(bearer.token().to_string())
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerSession
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts, state).await?;

        let (claims, session_id) = Arc::<AuthService>::from_ref(state)
            .verify_token(&token)
            .map_err(|_| reject(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", GENERIC_AUTH_FAILURE))?;
        let user_id = claims
            .user_id()
            .map_err(|_| reject(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", GENERIC_AUTH_FAILURE))?;

        Ok(BearerSession {
            user_id,
            session_id,
        })
    }
}

/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(user: AuthenticatedUser) -> impl IntoResponse {
///     format!("Hello, user {}", user.user_id)
/// }
/// ```
#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts, state).await?;
        let auth_service = Arc::<AuthService>::from_ref(state);

        let (_, session) = auth_service
            .authenticate(&token)
            .await
            .map_err(|e| match e {
                AuthError::Store(_) => reject(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error",
                ),
                _ => reject(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", GENERIC_AUTH_FAILURE),
            })?;

        Ok(AuthenticatedUser {
            user_id: session.user_id,
            session_id: session.id,
            address: session.address,
            chain_id: session.chain_id,
        })
    }
}
