//! Error types for cryptographic operations.

use thiserror::Error;

/// Cryptographic operation errors.
///
/// Variants never carry key material or plaintext fragments; messages are
/// safe to log verbatim.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed - wrong key or tampered data. The payload is
    /// unreadable as a whole; no partial plaintext is ever returned.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Key has the wrong length. Keys are exactly 32 bytes; anything else is
    /// a configuration or programmer error.
    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Wrapped-key envelope is structurally invalid.
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_decryption() {
        let err = CryptoError::Decryption("auth tag mismatch".to_string());
        assert!(err.to_string().contains("Decryption failed"));
    }

    #[test]
    fn test_invalid_key_length_display() {
        let err = CryptoError::InvalidKeyLength(16);
        assert!(err.to_string().contains("16"));
        assert!(err.to_string().contains("32"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<CryptoError>();
        assert_sync::<CryptoError>();
    }
}
