//! User repository implementation.

use async_trait::async_trait;
use braid_crypto::{Envelope, Sealed};
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use braid_core::{Error, Result, User, UserRepository};

/// PostgreSQL implementation of UserRepository.
pub struct PgUserRepository {
    pool: Pool<Postgres>,
}

impl PgUserRepository {
    /// Create a new PgUserRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(
        &self,
        username: &str,
        password_hash: &str,
        key_envelope: &Envelope,
    ) -> Result<User> {
        let row = sqlx::query(
            "INSERT INTO users (username, password_hash, key_iv, key_tag, key_ciphertext)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, username, password_hash, created_at",
        )
        .bind(username)
        .bind(password_hash)
        .bind(&key_envelope.iv)
        .bind(&key_envelope.tag)
        .bind(&key_envelope.ciphertext)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::InvalidInput(format!("username already taken: {username}"))
            }
            _ => Error::Database(e),
        })?;

        let user = user_from_row(&row);
        debug!(
            subsystem = "database",
            component = "users",
            op = "create",
            owner_id = user.id,
            "user created"
        );
        Ok(user)
    }

    async fn fetch(&self, id: i64) -> Result<User> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|r| user_from_row(&r)).ok_or(Error::UserNotFound(id))
    }

    async fn fetch_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|r| user_from_row(&r)))
    }

    async fn key_envelope(&self, user_id: i64) -> Result<Envelope> {
        let row = sqlx::query(
            "SELECT key_iv, key_tag, key_ciphertext FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::UserNotFound(user_id))?;

        Ok(Sealed {
            iv: row.get("key_iv"),
            ciphertext: row.get("key_ciphertext"),
            tag: row.get("key_tag"),
        })
    }
}
