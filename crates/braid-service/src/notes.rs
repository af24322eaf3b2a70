//! Note service: key resolution, encryption, persistence, relink, notify.
//!
//! Every write follows the same shape: pick the key from the note's target
//! visibility, seal the content under a fresh nonce, persist the row and its
//! outgoing reference edges in one transaction, then notify subscribers.
//! Events go out only after the transaction commits; a delivery failure never
//! affects the mutation.

use std::collections::HashMap;
use std::sync::Arc;

use braid_crypto::{open, seal};
use tracing::{debug, warn};

use braid_core::events::event_names;
use braid_core::{
    extract_references, CreateNoteRequest, Error, Event, EventHub, FeedSort, NotePayload,
    NoteRepository, Result, StoredNote, UpdateNoteRequest, DEFAULT_NOTE_TITLE,
};

use crate::keys::KeyVault;

/// Orchestrates note CRUD over the repository, the key vault, and the hub.
pub struct NoteStore {
    notes: Arc<dyn NoteRepository>,
    vault: Arc<KeyVault>,
    hub: Arc<EventHub>,
}

/// Trim a submitted title, falling back to the placeholder.
fn normalize_title(title: Option<&str>) -> String {
    let trimmed = title.unwrap_or("").trim();
    if trimmed.is_empty() {
        DEFAULT_NOTE_TITLE.to_string()
    } else {
        trimmed.to_string()
    }
}

impl NoteStore {
    pub fn new(notes: Arc<dyn NoteRepository>, vault: Arc<KeyVault>, hub: Arc<EventHub>) -> Self {
        Self { notes, vault, hub }
    }

    /// Create a note. Content is sealed under the key matching the requested
    /// visibility; reference edges come from `[[#id]]` markers in the
    /// plaintext.
    pub async fn create(&self, owner_id: i64, req: CreateNoteRequest) -> Result<NotePayload> {
        let title = normalize_title(req.title.as_deref());
        let refs: Vec<i64> = extract_references(&req.content).into_iter().collect();

        let key = self.vault.content_key(owner_id, req.is_public).await?;
        let sealed = seal(&key, req.content.as_bytes())?;

        let note = self
            .notes
            .insert(owner_id, &title, req.is_public, &sealed, &refs)
            .await?;

        debug!(
            subsystem = "service",
            component = "note_store",
            op = "create",
            note_id = note.id,
            owner_id = owner_id,
            edge_count = refs.len(),
            "note created"
        );

        let payload = payload_from(&note, req.content, Some(true));
        self.hub
            .send_to_owner(owner_id, &Event::NoteCreated(payload.clone()));
        if note.is_public {
            self.hub.broadcast(&Event::FeedChanged {
                kind: event_names::NOTE_CREATED,
                id: note.id,
            });
        }

        Ok(payload)
    }

    /// Read a note visible to the requester, decrypted.
    pub async fn read(&self, id: i64, requester: Option<i64>) -> Result<NotePayload> {
        let note = self.notes.fetch_visible(id, requester).await?;
        let content = self.decrypt(&note).await?;
        let owned = requester.map(|r| r == note.owner_id);
        Ok(payload_from(&note, content, owned))
    }

    /// Update a note the requester owns. The content is re-sealed under a
    /// fresh nonce on every update; a visibility flip re-seals the same
    /// plaintext under the other key in the same transaction.
    pub async fn update(
        &self,
        id: i64,
        owner_id: i64,
        req: UpdateNoteRequest,
    ) -> Result<NotePayload> {
        let title = normalize_title(Some(&req.title));
        let refs: Vec<i64> = extract_references(&req.content)
            .into_iter()
            .filter(|&target| target != id)
            .collect();

        let key = self.vault.content_key(owner_id, req.is_public).await?;
        let sealed = seal(&key, req.content.as_bytes())?;

        let update = self
            .notes
            .update(id, owner_id, &title, req.is_public, &sealed, &refs)
            .await?;

        debug!(
            subsystem = "service",
            component = "note_store",
            op = "update",
            note_id = id,
            owner_id = owner_id,
            edge_count = refs.len(),
            "note updated"
        );

        let payload = payload_from(&update.note, req.content, Some(true));
        self.hub
            .send_to_owner(owner_id, &Event::NoteUpdated(payload.clone()));
        if update.was_public || update.note.is_public {
            self.hub.broadcast(&Event::FeedChanged {
                kind: event_names::NOTE_UPDATED,
                id,
            });
        }

        Ok(payload)
    }

    /// Delete a note the requester owns. Returns whether anything was
    /// deleted; deleting an absent or foreign note is a quiet no-op.
    pub async fn delete(&self, id: i64, owner_id: i64) -> Result<bool> {
        match self.notes.delete(id, owner_id).await? {
            None => Ok(false),
            Some(was_public) => {
                self.hub.send_to_owner(owner_id, &Event::NoteDeleted { id });
                if was_public {
                    self.hub.broadcast(&Event::FeedChanged {
                        kind: event_names::NOTE_DELETED,
                        id,
                    });
                }
                Ok(true)
            }
        }
    }

    /// List the owner's notes in effective order, decrypted.
    pub async fn list(&self, owner_id: i64, title_query: Option<&str>) -> Result<Vec<NotePayload>> {
        let notes = self.notes.list_owned(owner_id, title_query).await?;
        Ok(self.decrypt_all(notes, Some(owner_id)).await)
    }

    /// List all public notes, most recent first, decrypted.
    pub async fn list_public(&self, title_query: Option<&str>) -> Result<Vec<NotePayload>> {
        let notes = self.notes.list_public(title_query).await?;
        Ok(self.decrypt_all(notes, None).await)
    }

    /// The combined feed: public notes plus the requester's private ones.
    pub async fn feed(
        &self,
        requester: Option<i64>,
        title_query: Option<&str>,
        sort: FeedSort,
    ) -> Result<Vec<NotePayload>> {
        let notes = self.notes.list_feed(requester, title_query, sort).await?;
        Ok(self.decrypt_all(notes, requester).await)
    }

    /// Decrypt one note's content with the key its visibility selects.
    pub(crate) async fn decrypt(&self, note: &StoredNote) -> Result<String> {
        let key = self.vault.content_key(note.owner_id, note.is_public).await?;
        let plaintext = open(&key, &note.content)?;
        String::from_utf8(plaintext)
            .map_err(|_| Error::Crypto("decrypted content is not UTF-8".to_string()))
    }

    /// Decrypt a listing, caching per-owner keys. A note that fails to
    /// decrypt is logged and dropped rather than failing the whole listing.
    async fn decrypt_all(&self, notes: Vec<StoredNote>, requester: Option<i64>) -> Vec<NotePayload> {
        let mut keys: HashMap<(i64, bool), [u8; 32]> = HashMap::new();
        let mut out = Vec::with_capacity(notes.len());

        for note in notes {
            let slot = (note.owner_id, note.is_public);
            let key = match keys.get(&slot) {
                Some(k) => *k,
                None => match self.vault.content_key(note.owner_id, note.is_public).await {
                    Ok(k) => {
                        keys.insert(slot, k);
                        k
                    }
                    Err(e) => {
                        warn!(
                            subsystem = "service",
                            component = "note_store",
                            note_id = note.id,
                            error = %e,
                            "skipping note, key resolution failed"
                        );
                        continue;
                    }
                },
            };

            match open(&key, &note.content).map(String::from_utf8) {
                Ok(Ok(content)) => {
                    let owned = requester.map(|r| r == note.owner_id);
                    out.push(payload_from(&note, content, owned));
                }
                _ => {
                    warn!(
                        subsystem = "service",
                        component = "note_store",
                        note_id = note.id,
                        "skipping note, content failed to decrypt"
                    );
                }
            }
        }

        out
    }
}

pub(crate) fn payload_from(note: &StoredNote, content: String, owned: Option<bool>) -> NotePayload {
    NotePayload {
        id: note.id,
        title: note.title.clone(),
        is_public: note.is_public,
        author: note.author.clone(),
        content,
        created_at: note.created_at,
        updated_at: note.updated_at,
        owned,
    }
}
