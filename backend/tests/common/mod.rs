//! Shared fixtures for integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use k256::ecdsa::SigningKey;
use std::sync::Arc;

use marketplace_auth::audit::MemoryAuditSink;
use marketplace_auth::auth::crypto::{address_from_verifying_key, eip191_digest};
use marketplace_auth::auth::{
    AccessTokenIssuer, AuthService, NonceIssuer, SessionManager, SiweVerifier,
};
use marketplace_auth::events::BroadcastNotifier;
use marketplace_auth::identity::InMemoryIdentityLinker;
use marketplace_auth::models::{AuthResult, SessionMetadata};
use marketplace_auth::store::InMemoryCredentialStore;

pub const DOMAIN: &str = "app.example";
pub const CHAIN: &str = "eip155:1";

pub struct TestApp {
    pub service: Arc<AuthService>,
    pub store: Arc<InMemoryCredentialStore>,
    pub identity: Arc<InMemoryIdentityLinker>,
    pub audit: Arc<MemoryAuditSink>,
    pub notifier: Arc<BroadcastNotifier>,
}

pub struct Wallet {
    pub key: SigningKey,
    pub address: String,
}

impl Wallet {
    pub fn from_seed(seed: u8) -> Self {
        let key = SigningKey::from_slice(&[seed; 32]).expect("valid test key");
        let address = address_from_verifying_key(key.verifying_key());
        Self { key, address }
    }

    pub fn sign(&self, message: &str) -> String {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&eip191_digest(message))
            .expect("signing succeeds");
        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte() + 27);
        format!("0x{}", hex::encode(bytes))
    }
}

pub fn siwe_message(address: &str, chain_id: u64, nonce: &str) -> String {
    siwe_message_with_expiry(address, chain_id, nonce, None)
}

pub fn siwe_message_with_expiry(
    address: &str,
    chain_id: u64,
    nonce: &str,
    expires: Option<DateTime<Utc>>,
) -> String {
    let mut message = format!(
        "{DOMAIN} wants you to sign in with your Ethereum account:\n\
         {address}\n\
         \n\
         Sign in to the marketplace\n\
         \n\
         URI: https://{DOMAIN}/login\n\
         Version: 1\n\
         Chain ID: {chain_id}\n\
         Nonce: {nonce}\n\
         Issued At: {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    if let Some(expires) = expires {
        message.push_str(&format!(
            "\nExpiration Time: {}",
            expires.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }
    message
}

pub fn test_app() -> TestApp {
    test_app_with(Duration::minutes(5), Duration::hours(24))
}

pub fn test_app_with(nonce_ttl: Duration, session_ttl: Duration) -> TestApp {
    let store = Arc::new(InMemoryCredentialStore::new());
    let identity = Arc::new(InMemoryIdentityLinker::new());
    let audit = Arc::new(MemoryAuditSink::new());
    let notifier = Arc::new(BroadcastNotifier::new(16));

    let sessions = SessionManager::new(
        store.clone(),
        AccessTokenIssuer::new(b"integration-secret", "marketplace-auth", Duration::hours(1)),
        audit.clone(),
        notifier.clone(),
        session_ttl,
    );

    let service = Arc::new(AuthService::new(
        NonceIssuer::new(store.clone(), nonce_ttl),
        SiweVerifier::new(store.clone()),
        identity.clone(),
        sessions,
        audit.clone(),
    ));

    TestApp {
        service,
        store,
        identity,
        audit,
        notifier,
    }
}

impl TestApp {
    /// Full nonce + signed message + verify round
    pub async fn login(&self, wallet: &Wallet) -> AuthResult {
        let nonce = self
            .service
            .get_nonce(&wallet.address, CHAIN, DOMAIN)
            .await
            .expect("nonce issued");
        let message = siwe_message(&wallet.address, 1, &nonce);
        let signature = wallet.sign(&message);

        self.service
            .verify_siwe(&wallet.address, &message, &signature, SessionMetadata::default())
            .await
            .expect("login succeeds")
    }
}
