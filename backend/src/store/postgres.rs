//! Postgres-backed credential store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Nonce, RevokedReason, Session};

use super::{CredentialStore, StoreError};

const SESSION_COLUMNS: &str = "id, user_id, address, chain_id, refresh_hash, previous_refresh_hash, \
     token_family_id, token_generation, created_at, expires_at, last_used_at, revoked_at, \
     revoked_reason, device_id, ip_address, user_agent, collection_intent_context";

/// Credential store on top of a sqlx connection pool
#[derive(Clone)]
pub struct PgCredentialStore {
    db_pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    async fn fetch_session_where(
        &self,
        condition: &str,
        value: &str,
    ) -> Result<Option<Session>, StoreError> {
        let query = format!(
            "SELECT {} FROM auth_sessions WHERE {} = $1",
            SESSION_COLUMNS, condition
        );
        let session = sqlx::query_as::<_, Session>(&query)
            .bind(value)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(session)
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create_nonce(&self, nonce: &Nonce) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO auth_nonces (value, account_id, chain_id, domain, used, issued_at, expires_at)
            VALUES ($1, $2, $3, $4, FALSE, $5, $6)
            "#,
        )
        .bind(&nonce.value)
        .bind(&nonce.account_id)
        .bind(&nonce.chain_id)
        .bind(&nonce.domain)
        .bind(nonce.issued_at)
        .bind(nonce.expires_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn try_use_nonce(
        &self,
        value: &str,
        account_id: &str,
        chain_id: &str,
        domain: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // Single conditional update: concurrent verifiers race on the row lock
        // and at most one of them sees rows_affected = 1
        let rows_affected = sqlx::query(
            r#"
            UPDATE auth_nonces
            SET used = TRUE, used_at = $5
            WHERE value = $1
              AND account_id = $2
              AND chain_id = $3
              AND domain = $4
              AND used = FALSE
              AND expires_at > $5
            "#,
        )
        .bind(value)
        .bind(account_id)
        .bind(chain_id)
        .bind(domain)
        .bind(now)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        Ok(rows_affected == 1)
    }

    async fn purge_nonces(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let rows_affected = sqlx::query("DELETE FROM auth_nonces WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.db_pool)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO auth_sessions (
                id, user_id, address, chain_id, refresh_hash, previous_refresh_hash,
                token_family_id, token_generation, created_at, expires_at, last_used_at,
                device_id, ip_address, user_agent, collection_intent_context
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.address)
        .bind(&session.chain_id)
        .bind(&session.refresh_hash)
        .bind(&session.previous_refresh_hash)
        .bind(session.token_family_id)
        .bind(session.token_generation)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.last_used_at)
        .bind(&session.device_id)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(&session.collection_intent_context)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let query = format!("SELECT {} FROM auth_sessions WHERE id = $1", SESSION_COLUMNS);
        let session = sqlx::query_as::<_, Session>(&query)
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(session)
    }

    async fn get_session_by_refresh_hash(
        &self,
        hash: &str,
    ) -> Result<Option<Session>, StoreError> {
        self.fetch_session_where("refresh_hash", hash).await
    }

    async fn get_session_by_previous_refresh_hash(
        &self,
        hash: &str,
    ) -> Result<Option<Session>, StoreError> {
        self.fetch_session_where("previous_refresh_hash", hash).await
    }

    async fn rotate_refresh_token(
        &self,
        session_id: Uuid,
        expected_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        // Compare-and-swap on the current hash; the loser of a concurrent
        // refresh matches zero rows
        let query = format!(
            r#"
            UPDATE auth_sessions
            SET previous_refresh_hash = refresh_hash,
                refresh_hash = $3,
                token_generation = token_generation + 1,
                last_used_at = $4
            WHERE id = $1
              AND refresh_hash = $2
              AND revoked_at IS NULL
              AND expires_at > $4
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );

        let session = sqlx::query_as::<_, Session>(&query)
            .bind(session_id)
            .bind(expected_hash)
            .bind(new_hash)
            .bind(now)
            .fetch_optional(&self.db_pool)
            .await?;

        Ok(session)
    }

    async fn revoke_session(
        &self,
        session_id: Uuid,
        reason: RevokedReason,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE auth_sessions
            SET revoked_at = $2, revoked_reason = $3
            WHERE id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(session_id)
        .bind(now)
        .bind(reason)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        Ok(rows_affected == 1)
    }

    async fn revoke_family(
        &self,
        family_id: Uuid,
        reason: RevokedReason,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE auth_sessions
            SET revoked_at = $2, revoked_reason = $3
            WHERE token_family_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(family_id)
        .bind(now)
        .bind(reason)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        Ok(rows_affected)
    }

    async fn revoke_user_sessions(
        &self,
        user_id: Uuid,
        reason: RevokedReason,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE auth_sessions
            SET revoked_at = $2, revoked_reason = $3
            WHERE user_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(now)
        .bind(reason)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        Ok(rows_affected)
    }
}
