//! Link repository implementation.
//!
//! Edges carry no payload of their own; the `(from, to)` pair is the whole
//! fact. `to_note_id` deliberately has no foreign key so a note may reference
//! an id that does not exist yet - dangling edges are invisible to every
//! query here because they all join back to `notes`.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::debug;

use braid_core::{
    BacklinkEntry, Error, GraphEdge, LinkRepository, Result, StoredNote, BACKLINK_LIMIT,
};

use crate::notes::note_from_row;

/// Upper bound on edges returned by a full-graph query.
const EDGE_QUERY_LIMIT: i64 = 10_000;

/// PostgreSQL implementation of LinkRepository.
pub struct PgLinkRepository {
    pool: Pool<Postgres>,
}

impl PgLinkRepository {
    /// Create a new PgLinkRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Replace a note's outgoing edges inside an open transaction.
///
/// Shared with the note repository so note writes and their relink land in
/// one transaction.
pub(crate) async fn replace_outgoing_tx(
    tx: &mut Transaction<'_, Postgres>,
    note_id: i64,
    targets: &[i64],
) -> Result<()> {
    sqlx::query("DELETE FROM note_links WHERE from_note_id = $1")
        .bind(note_id)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

    if !targets.is_empty() {
        sqlx::query(
            "INSERT INTO note_links (from_note_id, to_note_id)
             SELECT $1, t.id FROM unnest($2::bigint[]) AS t(id)
             WHERE t.id <> $1
             ON CONFLICT DO NOTHING",
        )
        .bind(note_id)
        .bind(targets)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
    }

    Ok(())
}

#[async_trait]
impl LinkRepository for PgLinkRepository {
    async fn replace_outgoing(&self, note_id: i64, targets: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        replace_outgoing_tx(&mut tx, note_id, targets).await?;
        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "links",
            op = "replace_outgoing",
            note_id = note_id,
            edge_count = targets.len(),
            "outgoing edges replaced"
        );
        Ok(())
    }

    async fn backlinks(&self, note_id: i64, requester: Option<i64>) -> Result<Vec<BacklinkEntry>> {
        // The target itself must be visible; otherwise the note "does not
        // exist" from the requester's point of view.
        let visible: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM notes WHERE id = $1 AND (is_public OR owner_id = $2)",
        )
        .bind(note_id)
        .bind(requester)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        if visible.is_none() {
            return Err(Error::NoteNotFound(note_id));
        }

        let rows = sqlx::query(
            "SELECT n.id, n.title, u.username AS author, n.is_public, n.updated_at
             FROM note_links l
             JOIN notes n ON n.id = l.from_note_id
             JOIN users u ON u.id = n.owner_id
             WHERE l.to_note_id = $1 AND (n.is_public OR n.owner_id = $2)
             ORDER BY n.updated_at DESC
             LIMIT $3",
        )
        .bind(note_id)
        .bind(requester)
        .bind(BACKLINK_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| BacklinkEntry {
                id: row.get("id"),
                title: row.get("title"),
                author: row.get("author"),
                is_public: row.get("is_public"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    async fn graph_notes(
        &self,
        requester: Option<i64>,
        title_query: Option<&str>,
    ) -> Result<Vec<StoredNote>> {
        let pattern = title_query.map(crate::escape_like);
        let rows = sqlx::query(
            "SELECT n.id, n.owner_id, u.username AS author, n.title, n.is_public,
                    n.content_iv, n.content_tag, n.content_ciphertext, n.created_at, n.updated_at
             FROM notes n
             JOIN users u ON u.id = n.owner_id
             WHERE (n.is_public OR n.owner_id = $1)
               AND ($2::text IS NULL OR n.title ILIKE '%' || $2 || '%')
             ORDER BY n.id ASC",
        )
        .bind(requester)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(note_from_row).collect())
    }

    async fn all_edges(&self) -> Result<Vec<GraphEdge>> {
        let rows = sqlx::query(
            "SELECT from_note_id, to_note_id FROM note_links
             ORDER BY from_note_id, to_note_id
             LIMIT $1",
        )
        .bind(EDGE_QUERY_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| GraphEdge {
                from: row.get("from_note_id"),
                to: row.get("to_note_id"),
            })
            .collect())
    }
}
