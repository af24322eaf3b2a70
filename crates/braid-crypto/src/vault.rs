//! Key vault: wraps per-user data keys under the server master key.
//!
//! Envelope encryption scheme: each user gets a random 32-byte data key at
//! registration, stored only as an AES-256-GCM envelope under the master key.
//! The master key itself is process configuration - never persisted here,
//! never logged. Losing it makes every wrapped key and every private note
//! permanently unrecoverable; that is the accepted trade-off.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher::{self, Sealed, KEY_LEN};
use crate::error::{CryptoError, CryptoResult};

/// Wrapped per-user key: an AES-256-GCM envelope around the hex-encoded
/// 32-byte data key.
pub type Envelope = Sealed;

/// Server-wide master key.
///
/// `Debug` is redacted so the key can never leak through logging or error
/// formatting; memory is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    /// Construct from raw bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from a 64-character hex string (the configuration format).
    pub fn from_hex(hex_str: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| CryptoError::InvalidEnvelope(format!("master key is not hex: {e}")))?;
        let bytes: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| CryptoError::InvalidKeyLength(b.len()))?;
        Ok(Self(bytes))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// Generate a fresh random 32-byte user data key.
pub fn generate_user_key() -> [u8; KEY_LEN] {
    cipher::generate_key()
}

/// Wrap a raw user key under the master key.
///
/// The key is hex-encoded before sealing, matching the stored envelope
/// format. Called once per user, at registration; envelopes are immutable
/// for the user's lifetime (no rotation).
pub fn wrap(master: &MasterKey, raw_user_key: &[u8; KEY_LEN]) -> CryptoResult<Envelope> {
    let key_hex = hex::encode(raw_user_key);
    cipher::seal(master.as_bytes(), key_hex.as_bytes())
}

/// Unwrap a user key envelope back to 32 raw bytes.
///
/// Fails with [`CryptoError::Decryption`] on tag mismatch (tampering or a
/// wrong master key) and with [`CryptoError::InvalidKeyLength`] if the
/// recovered key is not exactly 32 bytes.
pub fn unwrap(master: &MasterKey, envelope: &Envelope) -> CryptoResult<[u8; KEY_LEN]> {
    let key_hex = cipher::open(master.as_bytes(), envelope)?;
    let key_hex = String::from_utf8(key_hex)
        .map_err(|_| CryptoError::InvalidEnvelope("wrapped key is not UTF-8".into()))?;

    let raw = hex::decode(&key_hex)
        .map_err(|_| CryptoError::InvalidEnvelope("wrapped key is not hex".into()))?;

    raw.try_into()
        .map_err(|b: Vec<u8>| CryptoError::InvalidKeyLength(b.len()))
}
