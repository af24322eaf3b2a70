//! Graph layout repository implementation.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres};

use braid_core::{Error, GraphLayout, LayoutRepository, Result};

/// PostgreSQL implementation of LayoutRepository.
pub struct PgLayoutRepository {
    pool: Pool<Postgres>,
}

impl PgLayoutRepository {
    /// Create a new PgLayoutRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LayoutRepository for PgLayoutRepository {
    async fn get(&self, owner_id: i64, key: &str) -> Result<Option<GraphLayout>> {
        let value: Option<JsonValue> = sqlx::query_scalar(
            "SELECT layout FROM graph_layouts WHERE owner_id = $1 AND layout_key = $2",
        )
        .bind(owner_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match value {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, owner_id: i64, key: &str, layout: &GraphLayout) -> Result<()> {
        let value = serde_json::to_value(layout)?;

        sqlx::query(
            "INSERT INTO graph_layouts (owner_id, layout_key, layout)
             VALUES ($1, $2, $3)
             ON CONFLICT (owner_id, layout_key)
             DO UPDATE SET layout = EXCLUDED.layout, updated_at = now()",
        )
        .bind(owner_id)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }
}
