//! Session lifecycle: creation, refresh-token rotation, reuse detection and
//! revocation.
//!
//! Each login starts a token family. Every refresh rotates the family's
//! secret: the session keeps the hash of the current secret and of the one it
//! replaced. Presenting a replaced secret again means the secret was copied,
//! so the whole family is revoked before the caller is answered.
//!
//! ```text
//! ACTIVE(gen=0) --refresh--> ACTIVE(gen=1) --refresh--> ... --> REVOKED
//!                                                   (logout | reuse_detected | expired)
//! ```

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditRecord, AuditSink};
use crate::events::{spawn_login_notification, EventNotifier, LoginEvent};
use crate::models::{AuthResult, RevokedReason, Session, SessionMetadata};
use crate::store::CredentialStore;

use super::crypto::{generate_secret, hash_token, is_lower_hex, SECRET_HEX_LEN};
use super::error::AuthError;
use super::jwt::AccessTokenIssuer;

/// Owns every session state transition
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    tokens: AccessTokenIssuer,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn EventNotifier>,
    session_ttl: Duration,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: AccessTokenIssuer,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn EventNotifier>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            store,
            tokens,
            audit,
            notifier,
            session_ttl,
        }
    }

    pub fn tokens(&self) -> &AccessTokenIssuer {
        &self.tokens
    }

    /// Start a new token family for a verified login.
    ///
    /// Returns the access token and the raw refresh secret. The secret is
    /// only ever handed back here; the store sees its hash.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        address: &str,
        chain_id: &str,
        metadata: SessionMetadata,
    ) -> Result<AuthResult, AuthError> {
        let now = Utc::now();
        let secret = generate_secret();

        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            address: address.to_string(),
            chain_id: chain_id.to_string(),
            refresh_hash: hash_token(&secret),
            previous_refresh_hash: None,
            token_family_id: Uuid::new_v4(),
            token_generation: 0,
            created_at: now,
            expires_at: now + self.session_ttl,
            last_used_at: now,
            revoked_at: None,
            revoked_reason: None,
            device_id: metadata.device_id,
            ip_address: metadata.ip_address,
            user_agent: metadata.user_agent,
            collection_intent_context: metadata.collection_intent_context.map(sqlx::types::Json),
        };

        // Minted before the row exists so a minting failure leaves no session
        let access = self.tokens.mint(user_id, session.id)?;
        self.store.create_session(&session).await?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            family_id = %session.token_family_id,
            chain_id = %chain_id,
            "Session created"
        );

        self.audit
            .record(
                AuditRecord::success(AuditAction::Login)
                    .user(user_id)
                    .session(session.id)
                    .family(session.token_family_id)
                    .address(address)
                    .detail(serde_json::json!({
                        "chain_id": chain_id,
                        "ip_address": session.ip_address,
                        "device_id": session.device_id,
                    })),
            )
            .await;

        spawn_login_notification(
            self.notifier.clone(),
            LoginEvent {
                user_id,
                session_id: session.id,
                address: session.address.clone(),
                chain_id: session.chain_id.clone(),
                ip_address: session.ip_address.clone(),
                user_agent: session.user_agent.clone(),
                collection_intent_context: session.collection_intent().cloned(),
                occurred_at: now,
            },
        );

        Ok(package(&session, secret, access))
    }

    /// Exchange a refresh secret for a new access token and a new secret
    pub async fn refresh(&self, refresh_secret: &str) -> Result<AuthResult, AuthError> {
        let secret = normalize_refresh_secret(refresh_secret)?;
        let presented_hash = hash_token(&secret);
        let now = Utc::now();

        if let Some(session) = self.store.get_session_by_refresh_hash(&presented_hash).await? {
            if session.is_revoked() {
                tracing::debug!(session_id = %session.id, "Refresh on revoked session");
                return Err(AuthError::SessionNotFoundOrExpired);
            }

            if session.is_expired(now) {
                self.store
                    .revoke_session(session.id, RevokedReason::Expired, now)
                    .await?;
                tracing::info!(session_id = %session.id, "Session expired");
                return Err(AuthError::SessionNotFoundOrExpired);
            }

            let access = self.tokens.mint(session.user_id, session.id)?;
            let next_secret = generate_secret();
            let rotated = self
                .store
                .rotate_refresh_token(session.id, &presented_hash, &hash_token(&next_secret), now)
                .await?;

            let Some(rotated) = rotated else {
                // A concurrent refresh with the same secret rotated first; this
                // secret is already superseded
                tracing::info!(
                    session_id = %session.id,
                    family_id = %session.token_family_id,
                    "Lost refresh rotation race"
                );
                return Err(AuthError::SessionNotFoundOrExpired);
            };

            tracing::info!(
                user_id = %rotated.user_id,
                session_id = %rotated.id,
                family_id = %rotated.token_family_id,
                generation = rotated.token_generation,
                "Refresh token rotated"
            );

            self.audit
                .record(
                    AuditRecord::success(AuditAction::Refresh)
                        .user(rotated.user_id)
                        .session(rotated.id)
                        .family(rotated.token_family_id)
                        .detail(serde_json::json!({ "generation": rotated.token_generation })),
                )
                .await;

            return Ok(package(&rotated, next_secret, access));
        }

        if let Some(session) = self
            .store
            .get_session_by_previous_refresh_hash(&presented_hash)
            .await?
        {
            let revoked = self
                .revoke_family(session.token_family_id, RevokedReason::ReuseDetected)
                .await?;

            tracing::warn!(
                user_id = %session.user_id,
                session_id = %session.id,
                family_id = %session.token_family_id,
                generation = session.token_generation,
                revoked_sessions = revoked,
                "Refresh token reuse detected, token family revoked"
            );

            self.audit
                .record(
                    AuditRecord::failure(AuditAction::ReuseDetected)
                        .user(session.user_id)
                        .session(session.id)
                        .family(session.token_family_id)
                        .detail(serde_json::json!({
                            "generation": session.token_generation,
                            "revoked_sessions": revoked,
                        })),
                )
                .await;

            return Err(AuthError::ReuseDetected);
        }

        Err(AuthError::SessionNotFoundOrExpired)
    }

    /// Revoke one session (logout). Already-revoked or unknown ids are a no-op.
    pub async fn revoke(&self, session_id: Uuid) -> Result<(), AuthError> {
        let revoked = self
            .store
            .revoke_session(session_id, RevokedReason::Logout, Utc::now())
            .await?;

        if revoked {
            tracing::info!(session_id = %session_id, "Session revoked");
            self.audit
                .record(AuditRecord::success(AuditAction::Logout).session(session_id))
                .await;
        }

        Ok(())
    }

    /// Revoke the session currently holding `refresh_secret`
    pub async fn revoke_by_refresh_secret(&self, refresh_secret: &str) -> Result<(), AuthError> {
        let secret = normalize_refresh_secret(refresh_secret)?;
        let session = self
            .store
            .get_session_by_refresh_hash(&hash_token(&secret))
            .await?
            .ok_or(AuthError::SessionNotFoundOrExpired)?;

        self.revoke(session.id).await
    }

    /// Revoke every session in a token family.
    ///
    /// The store write runs on its own task, so it completes even if the
    /// calling request is cancelled while waiting on it.
    pub async fn revoke_family(
        &self,
        family_id: Uuid,
        reason: RevokedReason,
    ) -> Result<u64, AuthError> {
        let store = self.store.clone();
        let revoked = tokio::spawn(async move {
            store.revoke_family(family_id, reason, Utc::now()).await
        })
        .await
        .map_err(|e| AuthError::Internal(format!("revocation task failed: {}", e)))??;

        Ok(revoked)
    }

    /// Revoke every session of a user
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let revoked = self
            .store
            .revoke_user_sessions(user_id, RevokedReason::Logout, Utc::now())
            .await?;

        tracing::info!(user_id = %user_id, revoked_sessions = revoked, "All sessions revoked");
        self.audit
            .record(
                AuditRecord::success(AuditAction::LogoutAll)
                    .user(user_id)
                    .detail(serde_json::json!({ "revoked_sessions": revoked })),
            )
            .await;

        Ok(revoked)
    }

    /// Load a session that is neither revoked nor expired
    pub async fn active_session(&self, session_id: Uuid) -> Result<Session, AuthError> {
        self.store
            .get_session(session_id)
            .await?
            .filter(|s| s.is_active(Utc::now()))
            .ok_or(AuthError::SessionNotFoundOrExpired)
    }
}

/// Refresh secrets are 64 hex characters; case is not significant
pub fn normalize_refresh_secret(refresh_secret: &str) -> Result<String, AuthError> {
    let lowered = refresh_secret.to_ascii_lowercase();
    if !is_lower_hex(&lowered, SECRET_HEX_LEN) {
        return Err(AuthError::InvalidFormat("refresh token".to_string()));
    }
    Ok(lowered)
}

fn package(
    session: &Session,
    refresh_secret: String,
    (access_token, expires_at): (String, DateTime<Utc>),
) -> AuthResult {
    AuthResult {
        access_token,
        refresh_token: refresh_secret,
        token_type: "Bearer".to_string(),
        expires_at,
        user_id: session.user_id,
        address: session.address.clone(),
        chain_id: session.chain_id.clone(),
        session_id: session.id,
        token_generation: session.token_generation,
    }
}
