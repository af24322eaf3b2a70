//! Key resolution and user registration.
//!
//! Every note is sealed under exactly one key: the process-wide master key
//! when it is public, the owner's per-user key when it is private. The
//! per-user key is generated at registration, wrapped under the master key,
//! and stored only in wrapped form; it never rotates.

use std::sync::Arc;

use braid_crypto::{generate_user_key, unwrap, wrap, MasterKey};
use tracing::debug;

use braid_core::{Error, Result, User, UserRepository};

/// Resolves content keys and registers users.
pub struct KeyVault {
    master: MasterKey,
    users: Arc<dyn UserRepository>,
}

impl KeyVault {
    pub fn new(master: MasterKey, users: Arc<dyn UserRepository>) -> Self {
        Self { master, users }
    }

    /// Register a user: generate a fresh 32-byte key, wrap it under the
    /// master key, and store the envelope with the identity row.
    pub async fn register_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::InvalidInput("username must not be empty".to_string()));
        }

        let key = generate_user_key();
        let envelope = wrap(&self.master, &key)?;
        let user = self.users.create(username, password_hash, &envelope).await?;

        debug!(
            subsystem = "service",
            component = "key_vault",
            op = "register_user",
            owner_id = user.id,
            "user registered"
        );
        Ok(user)
    }

    /// Unwrap a user's stored key back to its 32 raw bytes.
    pub async fn user_key(&self, owner_id: i64) -> Result<[u8; 32]> {
        let envelope = self.users.key_envelope(owner_id).await?;
        Ok(unwrap(&self.master, &envelope)?)
    }

    /// The key a note's content is sealed under, selected solely by its
    /// visibility: master key for public, the owner's key for private.
    pub async fn content_key(&self, owner_id: i64, is_public: bool) -> Result<[u8; 32]> {
        if is_public {
            Ok(*self.master.as_bytes())
        } else {
            self.user_key(owner_id).await
        }
    }

    pub fn users(&self) -> &Arc<dyn UserRepository> {
        &self.users
    }
}
