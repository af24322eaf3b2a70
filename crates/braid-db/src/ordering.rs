//! Order repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tracing::debug;

use braid_core::{Error, OrderRepository, Result};

/// PostgreSQL implementation of OrderRepository.
pub struct PgOrderRepository {
    pool: Pool<Postgres>,
}

impl PgOrderRepository {
    /// Create a new PgOrderRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn replace_order(&self, owner_id: i64, note_ids: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // One unauthorized id rejects the whole request, before anything is
        // written.
        let invalid: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM unnest($2::bigint[]) AS t(id)
             WHERE NOT EXISTS (
                 SELECT 1 FROM notes n
                 WHERE n.id = t.id AND (n.owner_id = $1 OR n.is_public)
             )",
        )
        .bind(owner_id)
        .bind(note_ids)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if invalid > 0 {
            return Err(Error::Forbidden(
                "order contains notes that are neither yours nor public".to_string(),
            ));
        }

        sqlx::query("DELETE FROM note_orders WHERE owner_id = $1")
            .bind(owner_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        if !note_ids.is_empty() {
            // Dense 1..N positions in the submitted sequence.
            sqlx::query(
                "INSERT INTO note_orders (owner_id, note_id, sort_index)
                 SELECT $1, t.id, t.ord
                 FROM unnest($2::bigint[]) WITH ORDINALITY AS t(id, ord)",
            )
            .bind(owner_id)
            .bind(note_ids)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "ordering",
            op = "replace_order",
            owner_id = owner_id,
            result_count = note_ids.len(),
            "order replaced"
        );
        Ok(())
    }
}
