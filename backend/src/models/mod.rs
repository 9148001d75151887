//! Data models for the marketplace auth service

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod auth;
pub use auth::*;

/// User model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct User {
    pub id: Uuid,
    pub primary_wallet_address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Wallet linked to a user
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_address: String,
    pub chain_id: String,
    pub is_primary: bool,
    pub verified_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
