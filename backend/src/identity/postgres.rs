//! Postgres identity linker

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{User, Wallet};

use super::{IdentityError, IdentityLinker};

#[derive(Clone)]
pub struct PgIdentityLinker {
    db_pool: PgPool,
}

impl PgIdentityLinker {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    async fn find_user(&self, address: &str) -> Result<Option<User>, IdentityError> {
        // Primary address first, then any linked wallet
        let user: Option<User> = sqlx::query_as(
            r#"
            SELECT u.id, u.primary_wallet_address, u.created_at, u.updated_at
            FROM users u
            WHERE u.primary_wallet_address = $1
            UNION
            SELECT u.id, u.primary_wallet_address, u.created_at, u.updated_at
            FROM users u
            JOIN wallets w ON w.user_id = u.id
            WHERE w.wallet_address = $1
            LIMIT 1
            "#,
        )
        .bind(address)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(user)
    }
}

#[async_trait]
impl IdentityLinker for PgIdentityLinker {
    async fn ensure_user(&self, address: &str) -> Result<User, IdentityError> {
        if let Some(user) = self.find_user(address).await? {
            return Ok(user);
        }

        let now = Utc::now();

        // A concurrent first login for the same address may win the insert;
        // in that case read back the row it created
        let inserted: Option<User> = sqlx::query_as(
            r#"
            INSERT INTO users (id, primary_wallet_address, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (primary_wallet_address) DO NOTHING
            RETURNING id, primary_wallet_address, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(address)
        .bind(now)
        .fetch_optional(&self.db_pool)
        .await?;

        match inserted {
            Some(user) => {
                tracing::info!(user_id = %user.id, address = %address, "Created user");
                Ok(user)
            }
            None => self
                .find_user(address)
                .await?
                .ok_or_else(|| IdentityError::Database("user vanished after insert".to_string())),
        }
    }

    async fn link_wallet(
        &self,
        user_id: Uuid,
        address: &str,
        chain_id: &str,
    ) -> Result<Wallet, IdentityError> {
        let now = Utc::now();

        let wallet: Option<Wallet> = sqlx::query_as(
            r#"
            INSERT INTO wallets (id, user_id, wallet_address, chain_id, is_primary, verified_at, created_at, updated_at)
            VALUES (
                $1, $2, $3, $4,
                EXISTS (SELECT 1 FROM users WHERE id = $2 AND primary_wallet_address = $3),
                $5, $5, $5
            )
            ON CONFLICT (wallet_address, chain_id)
            DO UPDATE SET verified_at = EXCLUDED.verified_at, updated_at = EXCLUDED.updated_at
            WHERE wallets.user_id = EXCLUDED.user_id
            RETURNING id, user_id, wallet_address, chain_id, is_primary, verified_at, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(address)
        .bind(chain_id)
        .bind(now)
        .fetch_optional(&self.db_pool)
        .await?;

        wallet.ok_or(IdentityError::WalletLinkedToAnotherUser)
    }
}
