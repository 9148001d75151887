//! Authentication service
//!
//! Core business logic for SIWE login and session lifecycle. Composes the
//! nonce issuer, the SIWE verifier, the identity linker and the session
//! manager behind the operations the transport layer calls.

use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditRecord, AuditSink};
use crate::identity::IdentityLinker;
use crate::models::{AuthResult, Session, SessionMetadata};

use super::error::AuthError;
use super::jwt::Claims;
use super::nonce::NonceIssuer;
use super::session::SessionManager;
use super::verifier::SiweVerifier;

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    nonces: NonceIssuer,
    verifier: SiweVerifier,
    identity: Arc<dyn IdentityLinker>,
    sessions: SessionManager,
    audit: Arc<dyn AuditSink>,
}

impl AuthService {
    /// Create a new AuthService
    pub fn new(
        nonces: NonceIssuer,
        verifier: SiweVerifier,
        identity: Arc<dyn IdentityLinker>,
        sessions: SessionManager,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            nonces,
            verifier,
            identity,
            sessions,
            audit,
        }
    }

    /// Issue a login nonce for an account on a chain and domain
    pub async fn get_nonce(
        &self,
        account_id: &str,
        chain_id: &str,
        domain: &str,
    ) -> Result<String, AuthError> {
        self.nonces.issue(account_id, chain_id, domain).await
    }

    /// Verify a signed SIWE message and start a session
    ///
    /// # Arguments
    /// * `account_id` - Address the client signs in as
    /// * `message` - The exact SIWE message text that was signed
    /// * `signature` - `personal_sign` signature over `message`
    /// * `metadata` - Device and client details stored on the session
    pub async fn verify_siwe(
        &self,
        account_id: &str,
        message: &str,
        signature: &str,
        metadata: SessionMetadata,
    ) -> Result<AuthResult, AuthError> {
        let login = match self.verifier.verify(account_id, message, signature).await {
            Ok(login) => login,
            Err(e) => {
                self.audit
                    .record(
                        AuditRecord::failure(AuditAction::Login)
                            .address(account_id.to_ascii_lowercase())
                            .detail(serde_json::json!({ "error": e.to_string() })),
                    )
                    .await;
                return Err(e);
            }
        };

        // Nonce is spent from here on; a failure below needs a fresh login
        let user = self.identity.ensure_user(&login.address).await?;
        self.identity
            .link_wallet(user.id, &login.address, &login.chain_id)
            .await?;

        let result = self
            .sessions
            .create_session(user.id, &login.address, &login.chain_id, metadata)
            .await?;

        tracing::info!(
            user_id = %user.id,
            session_id = %result.session_id,
            address = %login.address,
            chain_id = %login.chain_id,
            domain = %login.domain,
            "SIWE login verified"
        );

        Ok(result)
    }

    /// Rotate a refresh token
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthResult, AuthError> {
        self.sessions.refresh(refresh_token).await
    }

    /// Revoke a session by id; safe to retry
    pub async fn logout(&self, session_id: &str) -> Result<(), AuthError> {
        let session_id = Uuid::parse_str(session_id)
            .map_err(|_| AuthError::InvalidFormat("session id".to_string()))?;
        self.sessions.revoke(session_id).await
    }

    /// Revoke the session that currently holds `refresh_token`
    pub async fn logout_by_refresh_token(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.sessions.revoke_by_refresh_secret(refresh_token).await
    }

    /// Revoke every session of a user
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        self.sessions.revoke_all_for_user(user_id).await
    }

    /// Check an access token's signature, issuer and expiry only.
    ///
    /// The session it names may already be revoked.
    pub fn verify_token(&self, access_token: &str) -> Result<(Claims, Uuid), AuthError> {
        let claims = self
            .sessions
            .tokens()
            .verify(access_token)
            .map_err(|_| AuthError::SessionNotFoundOrExpired)?;
        let session_id = claims
            .session_id()
            .map_err(|_| AuthError::SessionNotFoundOrExpired)?;
        Ok((claims, session_id))
    }

    /// Verify an access token and make sure its session is still live
    pub async fn authenticate(&self, access_token: &str) -> Result<(Claims, Session), AuthError> {
        let (claims, session_id) = self.verify_token(access_token)?;

        let session = self.sessions.active_session(session_id).await?;
        if claims.user_id().ok() != Some(session.user_id) {
            return Err(AuthError::SessionNotFoundOrExpired);
        }

        Ok((claims, session))
    }
}
