//! SIWE login verification
//!
//! Checks a signed ERC-4361 message against the account it claims to be
//! from, then consumes the nonce it carries. The nonce is consumed only
//! once the signature has been shown to come from the claimed account, so a
//! forged attempt cannot burn a legitimate user's challenge.

use chrono::Utc;
use std::sync::Arc;

use crate::store::CredentialStore;

use super::crypto::recover_personal_sign_address;
use super::error::AuthError;
use super::nonce::normalize_account_id;
use super::siwe::SiweMessage;

/// Outcome of a successful verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedLogin {
    /// Lowercase `0x` address of the signer
    pub address: String,
    /// CAIP-2 chain id, `eip155:<Chain ID>`
    pub chain_id: String,
    pub nonce: String,
    pub domain: String,
}

#[derive(Clone)]
pub struct SiweVerifier {
    store: Arc<dyn CredentialStore>,
}

impl SiweVerifier {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Verify `message` was signed by `account_id` and consume its nonce
    ///
    /// # Arguments
    /// * `account_id` - The address the client claims to sign in as
    /// * `message` - The exact SIWE message text that was signed
    /// * `signature` - 65-byte hex `personal_sign` signature
    pub async fn verify(
        &self,
        account_id: &str,
        message: &str,
        signature: &str,
    ) -> Result<VerifiedLogin, AuthError> {
        let account_id = normalize_account_id(account_id)?;
        let parsed = SiweMessage::parse(message)?;

        let address = parsed.address.to_ascii_lowercase();
        if address != account_id {
            return Err(AuthError::AccountMismatch);
        }

        let now = Utc::now();
        if !parsed.is_valid_at(now) {
            return Err(AuthError::OutsideValidityWindow);
        }

        let recovered = recover_personal_sign_address(message, signature)?;
        if recovered != address {
            tracing::debug!(
                claimed = %address,
                recovered = %recovered,
                "SIWE signature does not match claimed address"
            );
            return Err(AuthError::SignatureMismatch);
        }

        let chain_id = parsed.caip2_chain_id();
        let consumed = self
            .store
            .try_use_nonce(&parsed.nonce, &address, &chain_id, &parsed.domain, now)
            .await?;

        if !consumed {
            // Used, expired or issued for another context; all look the same
            tracing::info!(
                address = %address,
                chain_id = %chain_id,
                nonce_prefix = %parsed.nonce.get(..8).unwrap_or(&parsed.nonce),
                "SIWE nonce rejected"
            );
            return Err(AuthError::NonceInvalid);
        }

        Ok(VerifiedLogin {
            address,
            chain_id,
            nonce: parsed.nonce,
            domain: parsed.domain,
        })
    }
}
