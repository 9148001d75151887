//! Ethereum signature recovery and token hashing
//!
//! Recovers the signer of an EIP-191 `personal_sign` message and provides
//! the random secrets and digests used for nonces and refresh tokens.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use thiserror::Error;

/// Length in bytes of nonces and refresh secrets before hex encoding
pub const SECRET_BYTES: usize = 32;

/// Length of a hex-encoded secret
pub const SECRET_HEX_LEN: usize = SECRET_BYTES * 2;

/// Errors that can occur during signature recovery
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    #[error("Signature has a high S value")]
    MalleableSignature,

    #[error("Public key recovery failed")]
    RecoveryFailed,
}

/// Keccak-256 digest
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// EIP-191 version 0x45 digest of a message:
/// `keccak256("\x19Ethereum Signed Message:\n" ++ len(message) ++ message)`
pub fn eip191_digest(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message.as_bytes());
    hasher.finalize().into()
}

/// Lowercase `0x` address of a secp256k1 public key
pub fn address_from_verifying_key(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 uncompressed tag
    let hash = keccak256(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// Recover the lowercase `0x` address that produced `signature` over `message`
///
/// # Arguments
/// * `message` - The exact message text that was signed
/// * `signature` - 65-byte `r || s || v` signature, hex with optional `0x`
pub fn recover_personal_sign_address(
    message: &str,
    signature: &str,
) -> Result<String, CryptoError> {
    let (signature, recovery_id) = parse_signature(signature)?;
    let digest = eip191_digest(message);

    let key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|_| CryptoError::RecoveryFailed)?;

    Ok(address_from_verifying_key(&key))
}

fn parse_signature(signature: &str) -> Result<(Signature, RecoveryId), CryptoError> {
    let raw = signature.strip_prefix("0x").unwrap_or(signature);
    let bytes = hex::decode(raw)
        .map_err(|e| CryptoError::InvalidSignatureFormat(e.to_string()))?;

    if bytes.len() != 65 {
        return Err(CryptoError::InvalidSignatureFormat(format!(
            "Expected 65 bytes, got {}",
            bytes.len()
        )));
    }

    let signature = Signature::from_slice(&bytes[..64])
        .map_err(|e| CryptoError::InvalidSignatureFormat(e.to_string()))?;

    // EIP-2: only the low-S form is accepted
    if signature.normalize_s().is_some() {
        return Err(CryptoError::MalleableSignature);
    }

    let v = match bytes[64] {
        0 | 1 => bytes[64],
        27 | 28 => bytes[64] - 27,
        other => {
            return Err(CryptoError::InvalidSignatureFormat(format!(
                "Invalid recovery byte: {}",
                other
            )))
        }
    };
    let recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| CryptoError::InvalidSignatureFormat("Invalid recovery id".to_string()))?;

    Ok((signature, recovery_id))
}

/// Generate a cryptographically secure 32-byte secret, hex encoded
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether `value` is exactly `len` lowercase hex characters
pub fn is_lower_hex(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    fn sign(key: &SigningKey, message: &str) -> String {
        let digest = eip191_digest(message);
        let (signature, recovery_id) = key.sign_prehash_recoverable(&digest).unwrap();
        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte() + 27);
        format!("0x{}", hex::encode(bytes))
    }

    #[test]
    fn test_keccak256_empty() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_known_private_key_address() {
        // Private key 1 maps to a well-known address
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let key = SigningKey::from_slice(&secret).unwrap();
        assert_eq!(
            address_from_verifying_key(key.verifying_key()),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_recover_roundtrip() {
        let key = SigningKey::from_slice(&[0x42u8; 32]).unwrap();
        let expected = address_from_verifying_key(key.verifying_key());

        let signature = sign(&key, "hello marketplace");
        let recovered = recover_personal_sign_address("hello marketplace", &signature).unwrap();
        assert_eq!(recovered, expected);
    }

    #[test]
    fn test_recover_other_message_yields_other_address() {
        let key = SigningKey::from_slice(&[0x42u8; 32]).unwrap();
        let expected = address_from_verifying_key(key.verifying_key());

        let signature = sign(&key, "original");
        match recover_personal_sign_address("tampered", &signature) {
            Ok(recovered) => assert_ne!(recovered, expected),
            Err(e) => assert!(matches!(e, CryptoError::RecoveryFailed)),
        }
    }

    #[test]
    fn test_signature_wrong_length() {
        let result = recover_personal_sign_address("msg", "0xdeadbeef");
        assert!(matches!(result, Err(CryptoError::InvalidSignatureFormat(_))));
    }

    #[test]
    fn test_signature_bad_recovery_byte() {
        let key = SigningKey::from_slice(&[0x42u8; 32]).unwrap();
        let mut signature = sign(&key, "msg");
        signature.truncate(signature.len() - 2);
        signature.push_str("05");
        let result = recover_personal_sign_address("msg", &signature);
        assert!(matches!(result, Err(CryptoError::InvalidSignatureFormat(_))));
    }

    #[test]
    fn test_generate_secret_format() {
        let a = generate_secret();
        let b = generate_secret();
        assert!(is_lower_hex(&a, SECRET_HEX_LEN));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_token_is_sha256_hex() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_is_lower_hex() {
        assert!(is_lower_hex("00ff", 4));
        assert!(!is_lower_hex("00FF", 4));
        assert!(!is_lower_hex("00f", 4));
        assert!(!is_lower_hex("zzzz", 4));
    }
}
