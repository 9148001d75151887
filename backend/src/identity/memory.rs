//! In-memory identity linker for tests and local development

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{User, Wallet};

use super::{IdentityError, IdentityLinker};

#[derive(Default)]
pub struct InMemoryIdentityLinker {
    users: Mutex<HashMap<String, User>>,
    wallets: Mutex<HashMap<(String, String), Wallet>>,
    fail_linking: AtomicBool,
}

impl InMemoryIdentityLinker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `link_wallet` fail with [`IdentityError::Unavailable`]
    pub fn set_fail_linking(&self, fail: bool) {
        self.fail_linking.store(fail, Ordering::SeqCst);
    }

    pub async fn wallet_count(&self) -> usize {
        self.wallets.lock().await.len()
    }
}

#[async_trait]
impl IdentityLinker for InMemoryIdentityLinker {
    async fn ensure_user(&self, address: &str) -> Result<User, IdentityError> {
        let mut users = self.users.lock().await;
        let user = users.entry(address.to_string()).or_insert_with(|| {
            let now = Utc::now();
            User {
                id: Uuid::new_v4(),
                primary_wallet_address: address.to_string(),
                created_at: now,
                updated_at: now,
            }
        });
        Ok(user.clone())
    }

    async fn link_wallet(
        &self,
        user_id: Uuid,
        address: &str,
        chain_id: &str,
    ) -> Result<Wallet, IdentityError> {
        if self.fail_linking.load(Ordering::SeqCst) {
            return Err(IdentityError::Unavailable);
        }

        let now = Utc::now();
        let mut wallets = self.wallets.lock().await;
        let wallet = wallets
            .entry((address.to_string(), chain_id.to_string()))
            .or_insert_with(|| Wallet {
                id: Uuid::new_v4(),
                user_id,
                wallet_address: address.to_string(),
                chain_id: chain_id.to_string(),
                is_primary: true,
                verified_at: now,
                created_at: now,
                updated_at: now,
            });

        if wallet.user_id != user_id {
            return Err(IdentityError::WalletLinkedToAnotherUser);
        }
        wallet.verified_at = now;
        wallet.updated_at = now;
        Ok(wallet.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "0x1111111111111111111111111111111111111111";

    #[tokio::test]
    async fn test_ensure_user_reuses_existing() {
        let linker = InMemoryIdentityLinker::new();
        let a = linker.ensure_user(ADDRESS).await.unwrap();
        let b = linker.ensure_user(ADDRESS).await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_link_wallet_rejects_other_user() {
        let linker = InMemoryIdentityLinker::new();
        let user = linker.ensure_user(ADDRESS).await.unwrap();
        linker.link_wallet(user.id, ADDRESS, "eip155:1").await.unwrap();

        let result = linker.link_wallet(Uuid::new_v4(), ADDRESS, "eip155:1").await;
        assert!(matches!(result, Err(IdentityError::WalletLinkedToAnotherUser)));
        assert_eq!(linker.wallet_count().await, 1);
    }
}
