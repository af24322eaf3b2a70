//! Repository traits for braid's storage abstractions.
//!
//! These traits define the interfaces that concrete backends must satisfy,
//! enabling pluggable storage and testability. Repositories speak in sealed
//! content ([`braid_crypto::Sealed`]); encryption and decryption stay in the
//! service layer, so no backend ever sees plaintext note content.

use async_trait::async_trait;
use braid_crypto::{Envelope, Sealed};

use crate::error::Result;
use crate::models::*;

// =============================================================================
// NOTE REPOSITORY
// =============================================================================

/// Repository for note CRUD and listings.
///
/// Visibility rules are enforced here: any fetch scoped to a requester must
/// report an invisible or foreign note as [`crate::Error::NoteNotFound`],
/// indistinguishable from a note that does not exist.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Insert a new note and its outgoing link edges in one transaction.
    async fn insert(
        &self,
        owner_id: i64,
        title: &str,
        is_public: bool,
        content: &Sealed,
        links_to: &[i64],
    ) -> Result<StoredNote>;

    /// Replace a note's title, visibility, content, and outgoing link edges
    /// in one transaction. Returns the new row plus the pre-update
    /// visibility. Only the owner may update.
    async fn update(
        &self,
        id: i64,
        owner_id: i64,
        title: &str,
        is_public: bool,
        content: &Sealed,
        links_to: &[i64],
    ) -> Result<NoteUpdate>;

    /// Fetch a note the requester owns.
    async fn fetch_owned(&self, id: i64, owner_id: i64) -> Result<StoredNote>;

    /// Fetch a note visible to the requester: public, or owned by them.
    /// Anonymous requesters see only public notes.
    async fn fetch_visible(&self, id: i64, requester: Option<i64>) -> Result<StoredNote>;

    /// Delete a note owned by the requester, along with its link edges and
    /// order entry. Returns the deleted note's visibility, or `None` if no
    /// such owned note existed (deletion is idempotent).
    async fn delete(&self, id: i64, owner_id: i64) -> Result<Option<bool>>;

    /// List the owner's notes in effective order: explicitly ordered notes
    /// first by position, then unordered notes most-recently-updated first.
    /// `title_query` filters by case-insensitive title substring.
    async fn list_owned(&self, owner_id: i64, title_query: Option<&str>)
        -> Result<Vec<StoredNote>>;

    /// List all public notes, most recently updated first.
    async fn list_public(&self, title_query: Option<&str>) -> Result<Vec<StoredNote>>;

    /// List the combined feed visible to the requester: public notes plus
    /// the requester's private ones, in the given sort. [`FeedSort::Custom`]
    /// applies the requester's explicit order and falls back to recency for
    /// anonymous requesters.
    async fn list_feed(
        &self,
        requester: Option<i64>,
        title_query: Option<&str>,
        sort: FeedSort,
    ) -> Result<Vec<StoredNote>>;
}

// =============================================================================
// LINK REPOSITORY
// =============================================================================

/// Repository for the derived reference graph.
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Replace all outgoing edges of a note with the given target set.
    /// Self-references and duplicates must already be filtered out.
    async fn replace_outgoing(&self, note_id: i64, targets: &[i64]) -> Result<()>;

    /// List notes whose content references `note_id`, filtered to those
    /// visible to the requester, capped and most-recently-updated first.
    ///
    /// Fails with [`crate::Error::NoteNotFound`] when the target note itself
    /// is not visible to the requester.
    async fn backlinks(&self, note_id: i64, requester: Option<i64>) -> Result<Vec<BacklinkEntry>>;

    /// List every note visible to the requester, for graph construction.
    /// `title_query` filters by case-insensitive title substring.
    async fn graph_notes(
        &self,
        requester: Option<i64>,
        title_query: Option<&str>,
    ) -> Result<Vec<StoredNote>>;

    /// List all edges, bounded. Callers filter to visible endpoints.
    async fn all_edges(&self) -> Result<Vec<GraphEdge>>;
}

// =============================================================================
// ORDER REPOSITORY
// =============================================================================

/// Repository for explicit per-owner note ordering.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Replace the owner's entire order with `note_ids`, assigning dense
    /// positions 1..N in the given sequence, in one transaction.
    ///
    /// Every id must refer to a note the owner owns or a public note;
    /// otherwise the whole request fails with [`crate::Error::Forbidden`]
    /// and the stored order is untouched.
    async fn replace_order(&self, owner_id: i64, note_ids: &[i64]) -> Result<()>;
}

// =============================================================================
// LAYOUT REPOSITORY
// =============================================================================

/// Repository for persisted per-owner graph layouts.
#[async_trait]
pub trait LayoutRepository: Send + Sync {
    /// Fetch the layout stored under `(owner_id, key)`, if any.
    async fn get(&self, owner_id: i64, key: &str) -> Result<Option<GraphLayout>>;

    /// Insert or overwrite the layout stored under `(owner_id, key)`.
    async fn upsert(&self, owner_id: i64, key: &str, layout: &GraphLayout) -> Result<()>;
}

// =============================================================================
// USER REPOSITORY
// =============================================================================

/// Repository for user identities and their wrapped keys.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a user with their wrapped per-user key.
    async fn create(
        &self,
        username: &str,
        password_hash: &str,
        key_envelope: &Envelope,
    ) -> Result<User>;

    /// Fetch a user by id.
    async fn fetch(&self, id: i64) -> Result<User>;

    /// Fetch a user by username, if present.
    async fn fetch_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Fetch a user's wrapped key envelope.
    async fn key_envelope(&self, user_id: i64) -> Result<Envelope>;
}
