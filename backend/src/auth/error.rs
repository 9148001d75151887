//! Authentication error taxonomy

use thiserror::Error;

use crate::identity::IdentityError;
use crate::store::StoreError;

use super::crypto::CryptoError;
use super::jwt::JwtError;
use super::siwe::SiweError;

/// Errors returned by the credential and session lifecycle operations
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid account id: {0}")]
    InvalidAccountId(String),

    #[error("Invalid chain id: {0}")]
    InvalidChainId(String),

    #[error("Invalid domain")]
    InvalidDomain,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Malformed SIWE message: {0}")]
    MalformedMessage(#[from] SiweError),

    #[error("Message address does not match account")]
    AccountMismatch,

    #[error("Message is outside its validity window")]
    OutsideValidityWindow,

    #[error("Signature mismatch")]
    SignatureMismatch,

    #[error("Nonce invalid")]
    NonceInvalid,

    #[error("Session not found or expired")]
    SessionNotFoundOrExpired,

    #[error("Refresh token reuse detected")]
    ReuseDetected,

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by the transport layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// Malformed input, rejected before any side effect
    Validation,
    /// Credential could not be verified
    Authentication,
    Upstream,
    Store,
    Internal,
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::InvalidAccountId(_)
            | AuthError::InvalidChainId(_)
            | AuthError::InvalidDomain
            | AuthError::InvalidFormat(_)
            | AuthError::MalformedMessage(_)
            | AuthError::AccountMismatch
            | AuthError::OutsideValidityWindow => AuthErrorKind::Validation,
            AuthError::SignatureMismatch
            | AuthError::NonceInvalid
            | AuthError::SessionNotFoundOrExpired
            | AuthError::ReuseDetected => AuthErrorKind::Authentication,
            AuthError::Upstream(_) => AuthErrorKind::Upstream,
            AuthError::Store(_) => AuthErrorKind::Store,
            AuthError::Internal(_) => AuthErrorKind::Internal,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Store(e.to_string())
    }
}

impl From<IdentityError> for AuthError {
    fn from(e: IdentityError) -> Self {
        AuthError::Upstream(e.to_string())
    }
}

impl From<CryptoError> for AuthError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidSignatureFormat(msg) => AuthError::InvalidFormat(msg),
            CryptoError::MalleableSignature | CryptoError::RecoveryFailed => {
                AuthError::SignatureMismatch
            }
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(e: JwtError) -> Self {
        AuthError::Internal(e.to_string())
    }
}
