//! User identity and wallet linking
//!
//! Makes sure a durable user record exists for a verified address and that
//! the address is linked to it as a wallet on the signing chain.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{User, Wallet};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryIdentityLinker;
pub use postgres::PgIdentityLinker;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Wallet already linked to another user")]
    WalletLinkedToAnotherUser,

    #[error("Identity service unavailable")]
    Unavailable,
}

impl From<sqlx::Error> for IdentityError {
    fn from(e: sqlx::Error) -> Self {
        IdentityError::Database(e.to_string())
    }
}

#[async_trait]
pub trait IdentityLinker: Send + Sync {
    /// Find the user owning `address`, creating one if none exists
    async fn ensure_user(&self, address: &str) -> Result<User, IdentityError>;

    /// Link `address` on `chain_id` to `user_id`; idempotent for the same user
    async fn link_wallet(
        &self,
        user_id: Uuid,
        address: &str,
        chain_id: &str,
    ) -> Result<Wallet, IdentityError>;
}
