//! In-memory credential store
//!
//! Holds the same conditional-update semantics as the Postgres store, with a
//! single lock per table standing in for row-level atomicity. Used by tests
//! and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Nonce, RevokedReason, Session};

use super::{CredentialStore, StoreError};

#[derive(Default)]
pub struct InMemoryCredentialStore {
    nonces: RwLock<HashMap<String, Nonce>>,
    sessions: RwLock<HashMap<Uuid, Session>>,
    unavailable: AtomicBool,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn get_nonce(&self, value: &str) -> Option<Nonce> {
        self.nonces.read().await.get(value).cloned()
    }

    pub async fn sessions_in_family(&self, family_id: Uuid) -> Vec<Session> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.token_family_id == family_id)
            .cloned()
            .collect()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }
}

fn revoke(session: &mut Session, reason: RevokedReason, now: DateTime<Utc>) -> bool {
    if session.revoked_at.is_some() {
        return false;
    }
    session.revoked_at = Some(now);
    session.revoked_reason = Some(reason);
    true
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn create_nonce(&self, nonce: &Nonce) -> Result<(), StoreError> {
        self.check_available()?;
        let mut nonces = self.nonces.write().await;
        if nonces.contains_key(&nonce.value) {
            return Err(StoreError::Duplicate("nonce".to_string()));
        }
        nonces.insert(nonce.value.clone(), nonce.clone());
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
        self.check_available()?;
        let mut nonces = self.nonces.write().await;
        match nonces.get_mut(value) {
            Some(nonce) if nonce.is_consumable(account_id, chain_id, domain, now) => {
                nonce.used = true;
                nonce.used_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_nonces(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut nonces = self.nonces.write().await;
        let before = nonces.len();
        nonces.retain(|_, nonce| nonce.expires_at >= cutoff);
        Ok((before - nonces.len()) as u64)
    }

    async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        self.check_available()?;
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(StoreError::Duplicate("session".to_string()));
        }
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        self.check_available()?;
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn get_session_by_refresh_hash(
        &self,
        hash: &str,
    ) -> Result<Option<Session>, StoreError> {
        self.check_available()?;
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.refresh_hash == hash)
            .cloned())
    }

    async fn get_session_by_previous_refresh_hash(
        &self,
        hash: &str,
    ) -> Result<Option<Session>, StoreError> {
        self.check_available()?;
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.previous_refresh_hash.as_deref() == Some(hash))
            .cloned())
    }

    async fn rotate_refresh_token(
        &self,
        session_id: Uuid,
        expected_hash: &str,
        new_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, StoreError> {
        self.check_available()?;
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(&session_id) else {
            return Ok(None);
        };
        if session.refresh_hash != expected_hash || !session.is_active(now) {
            return Ok(None);
        }

        session.previous_refresh_hash = Some(std::mem::replace(
            &mut session.refresh_hash,
            new_hash.to_string(),
        ));
        session.token_generation += 1;
        session.last_used_at = now;
        Ok(Some(session.clone()))
    }

    async fn revoke_session(
        &self,
        session_id: Uuid,
        reason: RevokedReason,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .get_mut(&session_id)
            .map(|s| revoke(s, reason, now))
            .unwrap_or(false))
    }

    async fn revoke_family(
        &self,
        family_id: Uuid,
        reason: RevokedReason,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .values_mut()
            .filter(|s| s.token_family_id == family_id)
            .map(|s| revoke(s, reason, now))
            .filter(|revoked| *revoked)
            .count() as u64)
    }

    async fn revoke_user_sessions(
        &self,
        user_id: Uuid,
        reason: RevokedReason,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .values_mut()
            .filter(|s| s.user_id == user_id)
            .map(|s| revoke(s, reason, now))
            .filter(|revoked| *revoked)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn nonce(value: &str, now: DateTime<Utc>) -> Nonce {
        Nonce {
            value: value.to_string(),
            account_id: "0x1111111111111111111111111111111111111111".to_string(),
            chain_id: "eip155:1".to_string(),
            domain: "app.example".to_string(),
            used: false,
            used_at: None,
            issued_at: now,
            expires_at: now + Duration::minutes(5),
        }
    }

    fn session(now: DateTime<Utc>) -> Session {
        Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            address: "0x1111111111111111111111111111111111111111".to_string(),
            chain_id: "eip155:1".to_string(),
            refresh_hash: "hash-0".to_string(),
            previous_refresh_hash: None,
            token_family_id: Uuid::new_v4(),
            token_generation: 0,
            created_at: now,
            expires_at: now + Duration::hours(24),
            last_used_at: now,
            revoked_at: None,
            revoked_reason: None,
            device_id: None,
            ip_address: None,
            user_agent: None,
            collection_intent_context: None,
        }
    }

    #[tokio::test]
    async fn test_try_use_nonce_once() {
        let store = InMemoryCredentialStore::new();
        let now = Utc::now();
        let n = nonce("n1", now);
        store.create_nonce(&n).await.unwrap();

        let used = store
            .try_use_nonce("n1", &n.account_id, &n.chain_id, &n.domain, now)
            .await
            .unwrap();
        assert!(used);

        let again = store
            .try_use_nonce("n1", &n.account_id, &n.chain_id, &n.domain, now)
            .await
            .unwrap();
        assert!(!again);
    }

    #[tokio::test]
    async fn test_try_use_nonce_binding_mismatch() {
        let store = InMemoryCredentialStore::new();
        let now = Utc::now();
        let n = nonce("n1", now);
        store.create_nonce(&n).await.unwrap();

        let wrong_chain = store
            .try_use_nonce("n1", &n.account_id, "eip155:10", &n.domain, now)
            .await
            .unwrap();
        assert!(!wrong_chain);

        // A mismatched attempt does not burn the nonce
        assert!(!store.get_nonce("n1").await.unwrap().used);
    }

    #[tokio::test]
    async fn test_purge_nonces() {
        let store = InMemoryCredentialStore::new();
        let now = Utc::now();
        store.create_nonce(&nonce("old", now - Duration::days(10))).await.unwrap();
        store.create_nonce(&nonce("fresh", now)).await.unwrap();

        let purged = store.purge_nonces(now - Duration::days(1)).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.get_nonce("old").await.is_none());
        assert!(store.get_nonce("fresh").await.is_some());
    }

    #[tokio::test]
    async fn test_rotate_requires_expected_hash() {
        let store = InMemoryCredentialStore::new();
        let now = Utc::now();
        let s = session(now);
        store.create_session(&s).await.unwrap();

        let stale = store
            .rotate_refresh_token(s.id, "not-current", "hash-1", now)
            .await
            .unwrap();
        assert!(stale.is_none());

        let rotated = store
            .rotate_refresh_token(s.id, "hash-0", "hash-1", now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rotated.refresh_hash, "hash-1");
        assert_eq!(rotated.previous_refresh_hash.as_deref(), Some("hash-0"));
        assert_eq!(rotated.token_generation, 1);

        // Second rotation with the same expected hash loses the race
        let loser = store
            .rotate_refresh_token(s.id, "hash-0", "hash-2", now)
            .await
            .unwrap();
        assert!(loser.is_none());
    }

    #[tokio::test]
    async fn test_revoke_is_terminal() {
        let store = InMemoryCredentialStore::new();
        let now = Utc::now();
        let s = session(now);
        store.create_session(&s).await.unwrap();

        assert!(store.revoke_session(s.id, RevokedReason::Logout, now).await.unwrap());
        assert!(!store.revoke_session(s.id, RevokedReason::Logout, now).await.unwrap());

        let rotated = store
            .rotate_refresh_token(s.id, "hash-0", "hash-1", now)
            .await
            .unwrap();
        assert!(rotated.is_none());
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = InMemoryCredentialStore::new();
        store.set_unavailable(true);
        let result = store.get_session(Uuid::new_v4()).await;
        assert!(matches!(result, Err(StoreError::Unavailable)));
    }
}
