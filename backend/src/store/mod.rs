//! Durable storage for nonces and sessions
//!
//! Every mutating operation is a single conditional write so that concurrent
//! callers observe compare-and-swap semantics, and a dropped future never
//! leaves a half-applied change behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Nonce, RevokedReason, Session};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryCredentialStore;
pub use postgres::PgCredentialStore;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Store unavailable")]
    Unavailable,
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Duplicate(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => StoreError::Unavailable,
            _ => StoreError::Database(e.to_string()),
        }
    }
}

/// Storage contract for the credential lifecycle
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Persist a freshly issued nonce
    async fn create_nonce(&self, nonce: &Nonce) -> Result<(), StoreError>;

    /// Atomically mark a nonce used.
    ///
    /// Succeeds (returns `true`) only when the nonce exists, is unused, has not
    /// expired at `now`, and was issued for the same account, chain and domain.
    async fn try_use_nonce(
        &self,
        value: &str,
        account_id: &str,
        chain_id: &str,
        domain: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Delete nonces that expired before `cutoff`
    async fn purge_nonces(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn create_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>, StoreError>;

    /// Session whose current refresh hash is `hash`, in any state
    async fn get_session_by_refresh_hash(&self, hash: &str)
        -> Result<Option<Session>, StoreError>;

    /// Session whose previous (rotated-out) refresh hash is `hash`, in any state
    async fn get_session_by_previous_refresh_hash(
        &self,
        hash: &str,
    ) -> Result<Option<Session>, StoreError>;

    /// Rotate the refresh hash of an active session.
    ///
    /// Applies only while the session still holds `expected_hash`, is not
    /// revoked and has not expired at `now`. Returns the updated session, or
    /// `None` when the condition no longer holds.
    async fn rotate_refresh_token(
        &self,
        session_id: Uuid,
        expected_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError>;

    /// Revoke one session. Returns `false` if it was already revoked or absent.
    async fn revoke_session(
        &self,
        session_id: Uuid,
        reason: RevokedReason,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Revoke every not-yet-revoked session in a token family
    async fn revoke_family(
        &self,
        family_id: Uuid,
        reason: RevokedReason,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Revoke every not-yet-revoked session of a user
    async fn revoke_user_sessions(
        &self,
        user_id: Uuid,
        reason: RevokedReason,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}
