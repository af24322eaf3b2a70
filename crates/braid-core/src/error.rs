//! Error types for braid.

use thiserror::Error;

/// Result type alias using braid's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for braid operations.
///
/// Ownership mismatches are reported as [`Error::NoteNotFound`], never as a
/// distinct "exists but not yours" variant, so callers cannot probe for the
/// existence of other owners' private notes.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Note not found (or not visible to the requester)
    #[error("Note not found: {0}")]
    NoteNotFound(i64),

    /// User not found
    #[error("User not found: {0}")]
    UserNotFound(i64),

    /// Invalid input (malformed id, empty title, oversized layout)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Forbidden (authenticated but not authorized)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Cryptographic failure; message never contains key material
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<braid_crypto::CryptoError> for Error {
    fn from(e: braid_crypto::CryptoError) -> Self {
        Error::Crypto(e.to_string())
    }
}
