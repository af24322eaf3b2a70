//! Note repository implementation.

use async_trait::async_trait;
use braid_crypto::Sealed;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use braid_core::{Error, FeedSort, NoteRepository, NoteUpdate, Result, StoredNote};

use crate::links::replace_outgoing_tx;

/// PostgreSQL implementation of NoteRepository.
pub struct PgNoteRepository {
    pool: Pool<Postgres>,
}

impl PgNoteRepository {
    /// Create a new PgNoteRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Columns every note query must select, aliased for [`note_from_row`].
const NOTE_COLUMNS: &str = "n.id, n.owner_id, u.username AS author, n.title, n.is_public, \
     n.content_iv, n.content_tag, n.content_ciphertext, n.created_at, n.updated_at";

pub(crate) fn note_from_row(row: &PgRow) -> StoredNote {
    StoredNote {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        author: row.get("author"),
        title: row.get("title"),
        is_public: row.get("is_public"),
        content: Sealed {
            iv: row.get("content_iv"),
            ciphertext: row.get("content_ciphertext"),
            tag: row.get("content_tag"),
        },
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn insert(
        &self,
        owner_id: i64,
        title: &str,
        is_public: bool,
        content: &Sealed,
        links_to: &[i64],
    ) -> Result<StoredNote> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(
            "INSERT INTO notes (owner_id, title, is_public, content_iv, content_tag, content_ciphertext)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, created_at, updated_at",
        )
        .bind(owner_id)
        .bind(title)
        .bind(is_public)
        .bind(&content.iv)
        .bind(&content.tag)
        .bind(&content.ciphertext)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let id: i64 = row.get("id");

        let author: String = sqlx::query_scalar("SELECT username FROM users WHERE id = $1")
            .bind(owner_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::UserNotFound(owner_id))?;

        replace_outgoing_tx(&mut tx, id, links_to).await?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "notes",
            op = "insert",
            note_id = id,
            owner_id = owner_id,
            edge_count = links_to.len(),
            "note created"
        );

        Ok(StoredNote {
            id,
            owner_id,
            author,
            title: title.to_string(),
            is_public,
            content: content.clone(),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    async fn update(
        &self,
        id: i64,
        owner_id: i64,
        title: &str,
        is_public: bool,
        content: &Sealed,
        links_to: &[i64],
    ) -> Result<NoteUpdate> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Lock the row and capture pre-update visibility. An invisible or
        // foreign note reads as absent.
        let was_public: bool = sqlx::query_scalar(
            "SELECT is_public FROM notes WHERE id = $1 AND owner_id = $2 FOR UPDATE",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::NoteNotFound(id))?;

        let row = sqlx::query(&format!(
            "UPDATE notes n SET title = $3, is_public = $4, content_iv = $5, content_tag = $6,
                    content_ciphertext = $7, updated_at = now()
             FROM users u
             WHERE n.id = $1 AND n.owner_id = $2 AND u.id = n.owner_id
             RETURNING {NOTE_COLUMNS}"
        ))
        .bind(id)
        .bind(owner_id)
        .bind(title)
        .bind(is_public)
        .bind(&content.iv)
        .bind(&content.tag)
        .bind(&content.ciphertext)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        replace_outgoing_tx(&mut tx, id, links_to).await?;

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "notes",
            op = "update",
            note_id = id,
            owner_id = owner_id,
            edge_count = links_to.len(),
            "note updated"
        );

        Ok(NoteUpdate {
            note: note_from_row(&row),
            was_public,
        })
    }

    async fn fetch_owned(&self, id: i64, owner_id: i64) -> Result<StoredNote> {
        let row = sqlx::query(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes n
             JOIN users u ON u.id = n.owner_id
             WHERE n.id = $1 AND n.owner_id = $2"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|r| note_from_row(&r)).ok_or(Error::NoteNotFound(id))
    }

    async fn fetch_visible(&self, id: i64, requester: Option<i64>) -> Result<StoredNote> {
        let row = sqlx::query(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes n
             JOIN users u ON u.id = n.owner_id
             WHERE n.id = $1 AND (n.is_public OR n.owner_id = $2)"
        ))
        .bind(id)
        .bind(requester)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|r| note_from_row(&r)).ok_or(Error::NoteNotFound(id))
    }

    async fn delete(&self, id: i64, owner_id: i64) -> Result<Option<bool>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let was_public: Option<bool> = sqlx::query_scalar(
            "DELETE FROM notes WHERE id = $1 AND owner_id = $2 RETURNING is_public",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if was_public.is_some() {
            // Incoming edges have no FK; sweep both directions alongside the
            // note's own order entries.
            sqlx::query("DELETE FROM note_links WHERE from_note_id = $1 OR to_note_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
            sqlx::query("DELETE FROM note_orders WHERE note_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "notes",
            op = "delete",
            note_id = id,
            owner_id = owner_id,
            success = was_public.is_some(),
            "note delete"
        );

        Ok(was_public)
    }

    async fn list_owned(
        &self,
        owner_id: i64,
        title_query: Option<&str>,
    ) -> Result<Vec<StoredNote>> {
        let pattern = title_query.map(crate::escape_like);
        let rows = sqlx::query(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes n
             JOIN users u ON u.id = n.owner_id
             LEFT JOIN note_orders o ON o.owner_id = n.owner_id AND o.note_id = n.id
             WHERE n.owner_id = $1
               AND ($2::text IS NULL OR n.title ILIKE '%' || $2 || '%')
             ORDER BY (o.sort_index IS NULL), o.sort_index ASC, n.updated_at DESC"
        ))
        .bind(owner_id)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(note_from_row).collect())
    }

    async fn list_public(&self, title_query: Option<&str>) -> Result<Vec<StoredNote>> {
        let pattern = title_query.map(crate::escape_like);
        let rows = sqlx::query(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes n
             JOIN users u ON u.id = n.owner_id
             WHERE n.is_public
               AND ($1::text IS NULL OR n.title ILIKE '%' || $1 || '%')
             ORDER BY n.updated_at DESC"
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(note_from_row).collect())
    }

    async fn list_feed(
        &self,
        requester: Option<i64>,
        title_query: Option<&str>,
        sort: FeedSort,
    ) -> Result<Vec<StoredNote>> {
        let pattern = title_query.map(crate::escape_like);
        // Custom order joins the requester's explicit positions; with no
        // requester (or no positions) it degrades to recency.
        let sql = match sort {
            FeedSort::Custom => format!(
                "SELECT {NOTE_COLUMNS} FROM notes n
                 JOIN users u ON u.id = n.owner_id
                 LEFT JOIN note_orders o ON o.owner_id = $1 AND o.note_id = n.id
                 WHERE (n.is_public OR n.owner_id = $1)
                   AND ($2::text IS NULL OR n.title ILIKE '%' || $2 || '%')
                 ORDER BY (o.sort_index IS NULL), o.sort_index ASC, n.updated_at DESC"
            ),
            FeedSort::Date => format!(
                "SELECT {NOTE_COLUMNS} FROM notes n
                 JOIN users u ON u.id = n.owner_id
                 WHERE (n.is_public OR n.owner_id = $1)
                   AND ($2::text IS NULL OR n.title ILIKE '%' || $2 || '%')
                 ORDER BY n.updated_at DESC"
            ),
            FeedSort::Title => format!(
                "SELECT {NOTE_COLUMNS} FROM notes n
                 JOIN users u ON u.id = n.owner_id
                 WHERE (n.is_public OR n.owner_id = $1)
                   AND ($2::text IS NULL OR n.title ILIKE '%' || $2 || '%')
                 ORDER BY lower(n.title) ASC, n.updated_at DESC"
            ),
        };

        let rows = sqlx::query(&sql)
            .bind(requester)
            .bind(pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "notes",
            op = "list_feed",
            result_count = rows.len(),
            "feed listed"
        );

        Ok(rows.iter().map(note_from_row).collect())
    }
}
