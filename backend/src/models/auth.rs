//! Authentication models: nonces, sessions and the auth DTOs

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;
use validator::Validate;

/// Single-use login challenge bound to an account, chain and domain
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Nonce {
    pub value: String,
    pub account_id: String,
    pub chain_id: String,
    pub domain: String,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Nonce {
    /// Whether a consumption attempt at `now` with the given binding would succeed
    pub fn is_consumable(
        &self,
        account_id: &str,
        chain_id: &str,
        domain: &str,
        now: DateTime<Utc>,
    ) -> bool {
        !self.used
            && now < self.expires_at
            && self.account_id == account_id
            && self.chain_id == chain_id
            && self.domain == domain
    }
}

/// Why a session stopped being usable
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "revoked_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RevokedReason {
    Logout,
    ReuseDetected,
    Expired,
}

/// Opaque payload owned by the collection-intent feature.
///
/// Stored and returned unmodified; `version` lets the owning feature evolve
/// the payload shape without this service knowing about it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CollectionIntentContext {
    pub version: u16,
    pub payload: serde_json::Value,
}

/// Client metadata captured at login
#[derive(Debug, Default, Clone)]
pub struct SessionMetadata {
    pub device_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub collection_intent_context: Option<CollectionIntentContext>,
}

/// Authentication session: one row per refresh-token family
#[derive(Debug, sqlx::FromRow, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub address: String,
    pub chain_id: String,
    pub refresh_hash: String,
    pub previous_refresh_hash: Option<String>,
    pub token_family_id: Uuid,
    pub token_generation: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<RevokedReason>,
    pub device_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub collection_intent_context: Option<Json<CollectionIntentContext>>,
}

impl Session {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Not revoked and not past its expiry
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired(now)
    }

    pub fn collection_intent(&self) -> Option<&CollectionIntentContext> {
        self.collection_intent_context.as_ref().map(|ctx| &ctx.0)
    }
}

/// Result of a successful login or refresh. Never persisted.
#[derive(Debug, Serialize, Clone)]
pub struct AuthResult {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: Uuid,
    pub address: String,
    pub chain_id: String,
    pub session_id: Uuid,
    pub token_generation: i32,
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Request for a login nonce
#[derive(Debug, Deserialize, Validate)]
pub struct NonceRequest {
    #[validate(length(max = 64))]
    pub account_id: String,
    #[validate(length(max = 73))]
    pub chain_id: String,
    #[validate(length(max = 253))]
    pub domain: String,
}

/// Response carrying the issued nonce
#[derive(Debug, Serialize)]
pub struct NonceResponse {
    pub nonce: String,
}

/// Request to verify a signed SIWE message
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyRequest {
    #[validate(length(max = 64))]
    pub account_id: String,
    #[validate(length(max = 8192))]
    pub message: String,
    #[validate(length(max = 256))]
    pub signature: String,
    pub device_id: Option<String>,
    pub collection_intent_context: Option<CollectionIntentContext>,
}

/// Refresh token request
#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    pub revoked_sessions: u64,
}
