//! Access token minting and verification
//!
//! Access tokens are HS256 JWTs bound to a session. The signing key is
//! handed to [`AccessTokenIssuer::new`] at construction.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// JWT-related errors
#[derive(Error, Debug)]
pub enum JwtError {
    #[error("Token encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Token decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

/// JWT claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Session the token is bound to
    pub sid: String,
    /// Issuer
    pub iss: String,
    /// Unique token id
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|e| JwtError::InvalidToken(e.to_string()))
    }

    pub fn session_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sid).map_err(|e| JwtError::InvalidToken(e.to_string()))
    }
}

/// Mints and verifies session-bound access tokens
#[derive(Clone)]
pub struct AccessTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl AccessTokenIssuer {
    pub fn new(secret: &[u8], issuer: impl Into<String>, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            ttl,
        }
    }

    /// Mint an access token for `user_id` bound to `session_id`
    pub fn mint(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<(String, DateTime<Utc>), JwtError> {
        let now = Utc::now();
        // Whole seconds, so the returned expiry matches the `exp` claim
        let issued_at = Utc
            .timestamp_opt(now.timestamp(), 0)
            .single()
            .ok_or_else(|| JwtError::EncodingFailed("clock out of range".to_string()))?;
        let expires_at = issued_at
            .checked_add_signed(self.ttl)
            .ok_or_else(|| JwtError::EncodingFailed("token lifetime out of range".to_string()))?;

        let claims = Claims {
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingFailed(e.to_string()))?;

        Ok((token, expires_at))
    }

    /// Verify and decode an access token
    ///
    /// # Returns
    /// * `Ok(Claims)` if the signature, issuer and expiry check out
    /// * `Err(JwtError)` otherwise
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                _ => JwtError::DecodingFailed(e.to_string()),
            },
        )?;

        Ok(token_data.claims)
    }
}
