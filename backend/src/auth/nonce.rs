//! Login nonce issuance
//!
//! Nonces are 32 random bytes, hex encoded, bound to the account, CAIP-2
//! chain and domain they were requested for, and valid for a short TTL.

use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::models::Nonce;
use crate::store::CredentialStore;

use super::crypto::generate_secret;
use super::error::AuthError;

/// Issues single-use login challenges
#[derive(Clone)]
pub struct NonceIssuer {
    store: Arc<dyn CredentialStore>,
    ttl: Duration,
}

impl NonceIssuer {
    pub fn new(store: Arc<dyn CredentialStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Issue a nonce for `(account_id, chain_id, domain)` and return its value
    pub async fn issue(
        &self,
        account_id: &str,
        chain_id: &str,
        domain: &str,
    ) -> Result<String, AuthError> {
        let account_id = normalize_account_id(account_id)?;
        if !is_valid_caip2(chain_id) {
            return Err(AuthError::InvalidChainId(chain_id.to_string()));
        }
        if !is_valid_domain(domain) {
            return Err(AuthError::InvalidDomain);
        }

        let issued_at = Utc::now();
        let nonce = Nonce {
            value: generate_secret(),
            account_id,
            chain_id: chain_id.to_string(),
            domain: domain.to_string(),
            used: false,
            used_at: None,
            issued_at,
            expires_at: issued_at + self.ttl,
        };

        self.store.create_nonce(&nonce).await?;

        tracing::debug!(
            account_id = %nonce.account_id,
            chain_id = %nonce.chain_id,
            domain = %nonce.domain,
            nonce_prefix = %&nonce.value[..8],
            expires_at = %nonce.expires_at,
            "Issued login nonce"
        );

        Ok(nonce.value)
    }

    /// Delete nonces that expired more than `retention` ago
    pub async fn purge_expired(&self, retention: Duration) -> Result<u64, AuthError> {
        let purged = self.store.purge_nonces(Utc::now() - retention).await?;
        Ok(purged)
    }
}

/// Periodically purge nonces past the retention window. Never returns.
pub async fn nonce_purge_loop(issuer: NonceIssuer, retention: Duration, every: std::time::Duration) {
    tracing::info!(retention_hours = retention.num_hours(), "Starting nonce purge");

    loop {
        tokio::time::sleep(every).await;

        match issuer.purge_expired(retention).await {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged, "Purged expired nonces"),
            Err(e) => tracing::error!(error = %e, "Error purging nonces"),
        }
    }
}

/// Lower-case an account id and check it is a `0x` + 40 hex address
pub fn normalize_account_id(account_id: &str) -> Result<String, AuthError> {
    let lowered = account_id.trim().to_lowercase();
    if !is_valid_account_id(&lowered) {
        return Err(AuthError::InvalidAccountId(account_id.to_string()));
    }
    Ok(lowered)
}

/// `^0x[0-9a-f]{40}$`
pub fn is_valid_account_id(account_id: &str) -> bool {
    match account_id.strip_prefix("0x") {
        Some(hex) => {
            hex.len() == 40 && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        }
        None => false,
    }
}

/// CAIP-2 `namespace:reference`
///
/// namespace: `[-a-z0-9]{3,8}`, reference: `[-_a-zA-Z0-9]{1,32}`
pub fn is_valid_caip2(chain_id: &str) -> bool {
    let Some((namespace, reference)) = chain_id.split_once(':') else {
        return false;
    };

    let namespace_ok = (3..=8).contains(&namespace.len())
        && namespace
            .bytes()
            .all(|b| b == b'-' || b.is_ascii_lowercase() || b.is_ascii_digit());
    let reference_ok = (1..=32).contains(&reference.len())
        && reference
            .bytes()
            .all(|b| b == b'-' || b == b'_' || b.is_ascii_alphanumeric());

    namespace_ok && reference_ok
}

/// Non-empty and free of whitespace or control characters
pub fn is_valid_domain(domain: &str) -> bool {
    !domain.is_empty() && !domain.chars().any(|c| c.is_whitespace() || c.is_control())
}
