//! Authentication module for the marketplace
//!
//! Provides Sign-In-With-Ethereum login and the session lifecycle behind it.
//! - Single-use login nonces bound to account, chain and domain
//! - ERC-4361 message parsing and EIP-191 signature recovery
//! - Rotating refresh tokens with reuse detection and family revocation
//! - Short-lived JWT access tokens bound to a session

pub mod crypto;
mod error;
mod jwt;
pub mod nonce;
mod service;
mod session;
pub mod siwe;
mod verifier;

pub use error::{AuthError, AuthErrorKind};
pub use jwt::{AccessTokenIssuer, Claims, JwtError};
pub use nonce::NonceIssuer;
pub use service::AuthService;
pub use session::SessionManager;
pub use verifier::{SiweVerifier, VerifiedLogin};
