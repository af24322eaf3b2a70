//! AES-256-GCM cipher operations with detached authentication tags.
//!
//! Ciphertext, nonce, and tag are carried separately so the storage layer
//! can persist them in distinct columns.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Generate cryptographically secure random bytes.
pub fn generate_random<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Generate a random nonce (12 bytes).
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    generate_random()
}

/// Generate a random 32-byte symmetric key.
pub fn generate_key() -> [u8; KEY_LEN] {
    generate_random()
}

/// Sealed payload: nonce, ciphertext, and detached authentication tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// Random nonce used for this encryption (12 bytes).
    pub iv: Vec<u8>,
    /// Ciphertext without the authentication tag.
    pub ciphertext: Vec<u8>,
    /// Detached GCM authentication tag (16 bytes).
    pub tag: Vec<u8>,
}

/// Encrypt plaintext with AES-256-GCM under a fresh random nonce.
///
/// Every call draws a new nonce; nonce reuse under the same key is the one
/// forbidden state, so nonces are never cached or derived.
pub fn seal(key: &[u8], plaintext: &[u8]) -> CryptoResult<Sealed> {
    let key: &[u8; KEY_LEN] = key
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;

    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let iv = generate_nonce();
    let nonce = Nonce::from_slice(&iv);

    let mut combined = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::Encryption("AES-GCM encryption failed".into()))?;

    // aes-gcm appends the tag; split it off so callers store it separately.
    let tag = combined.split_off(combined.len() - TAG_LEN);

    Ok(Sealed {
        iv: iv.to_vec(),
        ciphertext: combined,
        tag,
    })
}

/// Decrypt a sealed payload with AES-256-GCM.
///
/// Fails wholesale when the tag does not verify - the payload is treated as
/// unreadable, never as a partial result.
pub fn open(key: &[u8], sealed: &Sealed) -> CryptoResult<Vec<u8>> {
    let key: &[u8; KEY_LEN] = key
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;

    if sealed.iv.len() != NONCE_LEN {
        return Err(CryptoError::InvalidEnvelope(format!(
            "nonce must be {} bytes, got {}",
            NONCE_LEN,
            sealed.iv.len()
        )));
    }
    if sealed.tag.len() != TAG_LEN {
        return Err(CryptoError::InvalidEnvelope(format!(
            "tag must be {} bytes, got {}",
            TAG_LEN,
            sealed.tag.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| CryptoError::Decryption("Invalid key".to_string()))?;

    let nonce = Nonce::from_slice(&sealed.iv);

    let mut combined = Vec::with_capacity(sealed.ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(&sealed.ciphertext);
    combined.extend_from_slice(&sealed.tag);

    cipher
        .decrypt(nonce, combined.as_slice())
        .map_err(|_| CryptoError::Decryption("AES-GCM decryption failed".to_string()))
}
