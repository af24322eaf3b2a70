//! # braid-crypto
//!
//! Cryptographic primitives for braid's per-owner note confidentiality.
//!
//! Two small components, both leaves:
//!
//! - [`cipher`] - AES-256-GCM authenticated encryption of arbitrary byte
//!   payloads with detached tags ("CipherBox").
//! - [`vault`] - envelope encryption of per-user 32-byte data keys under the
//!   process-wide master key ("KeyVault").
//!
//! ## Key discipline
//!
//! Keys are always exactly 32 bytes; any other length fails fast with
//! [`CryptoError::InvalidKeyLength`] rather than being truncated or padded.
//! Every encryption draws a fresh random 12-byte nonce. A failed tag check
//! means the payload is unreadable as a whole - partial plaintext is never
//! returned.
//!
//! ## Example
//!
//! ```rust
//! use braid_crypto::{cipher, vault, MasterKey};
//!
//! let master = MasterKey::new([7u8; 32]);
//!
//! // Registration: wrap a fresh user key under the master key.
//! let user_key = vault::generate_user_key();
//! let envelope = vault::wrap(&master, &user_key).unwrap();
//!
//! // Later: unwrap and use it to seal note content.
//! let key = vault::unwrap(&master, &envelope).unwrap();
//! let sealed = cipher::seal(&key, b"my private note").unwrap();
//! assert_eq!(cipher::open(&key, &sealed).unwrap(), b"my private note");
//! ```

pub mod cipher;
pub mod error;
pub mod vault;

// Re-export commonly used types
pub use cipher::{generate_key, generate_nonce, generate_random, open, seal, Sealed};
pub use error::{CryptoError, CryptoResult};
pub use vault::{generate_user_key, unwrap, wrap, Envelope, MasterKey};

#[cfg(test)]
mod integration_tests {
    use super::*;

    /// Full envelope workflow: wrap -> unwrap -> seal -> open.
    #[test]
    fn test_full_envelope_workflow() {
        let master = MasterKey::new([1u8; 32]);

        let user_key = generate_user_key();
        let envelope = wrap(&master, &user_key).unwrap();

        let recovered = unwrap(&master, &envelope).unwrap();
        let sealed = seal(&recovered, b"note body with [[#42]]").unwrap();
        let plaintext = open(&recovered, &sealed).unwrap();

        assert_eq!(plaintext, b"note body with [[#42]]");

        // Content sealed under the user key is unreadable under the master key.
        assert!(open(master.as_bytes(), &sealed).is_err());
    }

    /// Keys never cross visibility states: master-key ciphertext is not
    /// readable with a user key and vice versa.
    #[test]
    fn test_no_cross_key_readability() {
        let master = MasterKey::new([1u8; 32]);
        let user_key = generate_user_key();

        let public_sealed = seal(master.as_bytes(), b"public note").unwrap();
        let private_sealed = seal(&user_key, b"private note").unwrap();

        assert!(open(&user_key, &public_sealed).is_err());
        assert!(open(master.as_bytes(), &private_sealed).is_err());
    }
}
