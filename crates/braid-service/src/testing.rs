//! In-memory repository backend for service-level tests.
//!
//! Implements every repository trait over a single mutex-guarded state so
//! service behavior (key selection, visibility, ordering, events) can be
//! tested without PostgreSQL. Semantics mirror the SQL implementations,
//! including error shapes.
//!
//! Always compiled so integration tests (in `tests/`) can use it.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use braid_crypto::{Envelope, Sealed};
use chrono::Utc;

use braid_core::{
    BacklinkEntry, Error, FeedSort, GraphEdge, GraphLayout, LayoutRepository, LinkRepository,
    NoteRepository, NoteUpdate, OrderRepository, Result, StoredNote, User, UserRepository,
    BACKLINK_LIMIT,
};

struct MemNote {
    row: StoredNote,
    /// Monotonic write counter standing in for `updated_at` ordering, which
    /// wall-clock timestamps cannot provide reliably within one test.
    touch: u64,
}

#[derive(Default)]
struct State {
    next_user_id: i64,
    next_note_id: i64,
    seq: u64,
    users: HashMap<i64, (User, Envelope)>,
    notes: HashMap<i64, MemNote>,
    links: BTreeSet<(i64, i64)>,
    orders: HashMap<i64, Vec<i64>>,
    layouts: HashMap<(i64, String), GraphLayout>,
}

impl State {
    fn visible(&self, note: &StoredNote, requester: Option<i64>) -> bool {
        note.is_public || requester == Some(note.owner_id)
    }

    fn replace_outgoing(&mut self, note_id: i64, targets: &[i64]) {
        self.links.retain(|&(from, _)| from != note_id);
        for &to in targets {
            if to != note_id {
                self.links.insert((note_id, to));
            }
        }
    }
}

fn title_matches(title: &str, query: Option<&str>) -> bool {
    match query {
        None => true,
        Some(q) => title.to_lowercase().contains(&q.to_lowercase()),
    }
}

/// In-memory backend implementing every repository trait.
#[derive(Default)]
pub struct MemBackend {
    state: Mutex<State>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Overwrite a note's stored ciphertext, for corrupting content in tests.
    pub fn tamper_content(&self, note_id: i64, content: Sealed) {
        let mut state = self.lock();
        if let Some(note) = state.notes.get_mut(&note_id) {
            note.row.content = content;
        }
    }

    /// Raw stored row, for asserting on ciphertext.
    pub fn stored(&self, note_id: i64) -> Option<StoredNote> {
        self.lock().notes.get(&note_id).map(|n| n.row.clone())
    }

    /// Current edge set, sorted.
    pub fn edges(&self) -> Vec<(i64, i64)> {
        self.lock().links.iter().copied().collect()
    }
}

#[async_trait]
impl UserRepository for MemBackend {
    async fn create(
        &self,
        username: &str,
        password_hash: &str,
        key_envelope: &Envelope,
    ) -> Result<User> {
        let mut state = self.lock();
        if state.users.values().any(|(u, _)| u.username == username) {
            return Err(Error::InvalidInput(format!(
                "username already taken: {username}"
            )));
        }
        state.next_user_id += 1;
        let user = User {
            id: state.next_user_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        state
            .users
            .insert(user.id, (user.clone(), key_envelope.clone()));
        Ok(user)
    }

    async fn fetch(&self, id: i64) -> Result<User> {
        self.lock()
            .users
            .get(&id)
            .map(|(u, _)| u.clone())
            .ok_or(Error::UserNotFound(id))
    }

    async fn fetch_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|(u, _)| u.username == username)
            .map(|(u, _)| u.clone()))
    }

    async fn key_envelope(&self, user_id: i64) -> Result<Envelope> {
        self.lock()
            .users
            .get(&user_id)
            .map(|(_, e)| e.clone())
            .ok_or(Error::UserNotFound(user_id))
    }
}

#[async_trait]
impl NoteRepository for MemBackend {
    async fn insert(
        &self,
        owner_id: i64,
        title: &str,
        is_public: bool,
        content: &Sealed,
        links_to: &[i64],
    ) -> Result<StoredNote> {
        let mut state = self.lock();
        let author = state
            .users
            .get(&owner_id)
            .map(|(u, _)| u.username.clone())
            .ok_or(Error::UserNotFound(owner_id))?;

        state.next_note_id += 1;
        state.seq += 1;
        let now = Utc::now();
        let row = StoredNote {
            id: state.next_note_id,
            owner_id,
            author,
            title: title.to_string(),
            is_public,
            content: content.clone(),
            created_at: now,
            updated_at: now,
        };
        let id = row.id;
        let touch = state.seq;
        state.notes.insert(id, MemNote { row: row.clone(), touch });
        state.replace_outgoing(id, links_to);
        Ok(row)
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
        let mut state = self.lock();
        state.seq += 1;
        let touch = state.seq;

        let note = state.notes.get_mut(&id).ok_or(Error::NoteNotFound(id))?;
        if note.row.owner_id != owner_id {
            return Err(Error::NoteNotFound(id));
        }

        let was_public = note.row.is_public;
        note.row.title = title.to_string();
        note.row.is_public = is_public;
        note.row.content = content.clone();
        note.row.updated_at = Utc::now();
        note.touch = touch;
        let row = note.row.clone();

        state.replace_outgoing(id, links_to);
        Ok(NoteUpdate {
            note: row,
            was_public,
        })
    }

    async fn fetch_owned(&self, id: i64, owner_id: i64) -> Result<StoredNote> {
        self.lock()
            .notes
            .get(&id)
            .filter(|n| n.row.owner_id == owner_id)
            .map(|n| n.row.clone())
            .ok_or(Error::NoteNotFound(id))
    }

    async fn fetch_visible(&self, id: i64, requester: Option<i64>) -> Result<StoredNote> {
        let state = self.lock();
        state
            .notes
            .get(&id)
            .filter(|n| state.visible(&n.row, requester))
            .map(|n| n.row.clone())
            .ok_or(Error::NoteNotFound(id))
    }

    async fn delete(&self, id: i64, owner_id: i64) -> Result<Option<bool>> {
        let mut state = self.lock();
        match state.notes.get(&id) {
            Some(n) if n.row.owner_id == owner_id => {}
            _ => return Ok(None),
        }
        let was_public = state.notes.remove(&id).map(|n| n.row.is_public);
        state.links.retain(|&(from, to)| from != id && to != id);
        for order in state.orders.values_mut() {
            order.retain(|&nid| nid != id);
        }
        Ok(was_public)
    }

    async fn list_owned(
        &self,
        owner_id: i64,
        title_query: Option<&str>,
    ) -> Result<Vec<StoredNote>> {
        let state = self.lock();
        let positions = position_map(&state, owner_id);
        let mut notes: Vec<&MemNote> = state
            .notes
            .values()
            .filter(|n| n.row.owner_id == owner_id && title_matches(&n.row.title, title_query))
            .collect();
        sort_effective(&mut notes, &positions);
        Ok(notes.into_iter().map(|n| n.row.clone()).collect())
    }

    async fn list_public(&self, title_query: Option<&str>) -> Result<Vec<StoredNote>> {
        let state = self.lock();
        let mut notes: Vec<&MemNote> = state
            .notes
            .values()
            .filter(|n| n.row.is_public && title_matches(&n.row.title, title_query))
            .collect();
        notes.sort_by(|a, b| b.touch.cmp(&a.touch));
        Ok(notes.into_iter().map(|n| n.row.clone()).collect())
    }

    async fn list_feed(
        &self,
        requester: Option<i64>,
        title_query: Option<&str>,
        sort: FeedSort,
    ) -> Result<Vec<StoredNote>> {
        let state = self.lock();
        let mut notes: Vec<&MemNote> = state
            .notes
            .values()
            .filter(|n| state.visible(&n.row, requester) && title_matches(&n.row.title, title_query))
            .collect();

        match (sort, requester) {
            (FeedSort::Custom, Some(owner)) => {
                let positions = position_map(&state, owner);
                sort_effective(&mut notes, &positions);
            }
            (FeedSort::Custom, None) | (FeedSort::Date, _) => {
                notes.sort_by(|a, b| b.touch.cmp(&a.touch));
            }
            (FeedSort::Title, _) => {
                notes.sort_by(|a, b| {
                    a.row
                        .title
                        .to_lowercase()
                        .cmp(&b.row.title.to_lowercase())
                        .then(b.touch.cmp(&a.touch))
                });
            }
        }

        Ok(notes.into_iter().map(|n| n.row.clone()).collect())
    }
}

fn position_map(state: &State, owner_id: i64) -> HashMap<i64, usize> {
    state
        .orders
        .get(&owner_id)
        .map(|ids| ids.iter().enumerate().map(|(i, &id)| (id, i)).collect())
        .unwrap_or_default()
}

fn sort_effective(notes: &mut [&MemNote], positions: &HashMap<i64, usize>) {
    notes.sort_by(|a, b| {
        match (positions.get(&a.row.id), positions.get(&b.row.id)) {
            (Some(pa), Some(pb)) => pa.cmp(pb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => b.touch.cmp(&a.touch),
        }
    });
}

#[async_trait]
impl LinkRepository for MemBackend {
    async fn replace_outgoing(&self, note_id: i64, targets: &[i64]) -> Result<()> {
        self.lock().replace_outgoing(note_id, targets);
        Ok(())
    }

    async fn backlinks(&self, note_id: i64, requester: Option<i64>) -> Result<Vec<BacklinkEntry>> {
        let state = self.lock();
        let target_visible = state
            .notes
            .get(&note_id)
            .is_some_and(|n| state.visible(&n.row, requester));
        if !target_visible {
            return Err(Error::NoteNotFound(note_id));
        }

        let mut sources: Vec<&MemNote> = state
            .links
            .iter()
            .filter(|&&(_, to)| to == note_id)
            .filter_map(|&(from, _)| state.notes.get(&from))
            .filter(|n| state.visible(&n.row, requester))
            .collect();
        sources.sort_by(|a, b| b.touch.cmp(&a.touch));
        sources.truncate(BACKLINK_LIMIT as usize);

        Ok(sources
            .into_iter()
            .map(|n| BacklinkEntry {
                id: n.row.id,
                title: n.row.title.clone(),
                author: n.row.author.clone(),
                is_public: n.row.is_public,
                updated_at: n.row.updated_at,
            })
            .collect())
    }

    async fn graph_notes(
        &self,
        requester: Option<i64>,
        title_query: Option<&str>,
    ) -> Result<Vec<StoredNote>> {
        let state = self.lock();
        let mut notes: Vec<StoredNote> = state
            .notes
            .values()
            .filter(|n| state.visible(&n.row, requester) && title_matches(&n.row.title, title_query))
            .map(|n| n.row.clone())
            .collect();
        notes.sort_by_key(|n| n.id);
        Ok(notes)
    }

    async fn all_edges(&self) -> Result<Vec<GraphEdge>> {
        Ok(self
            .lock()
            .links
            .iter()
            .map(|&(from, to)| GraphEdge { from, to })
            .collect())
    }
}

#[async_trait]
impl OrderRepository for MemBackend {
    async fn replace_order(&self, owner_id: i64, note_ids: &[i64]) -> Result<()> {
        let mut state = self.lock();
        for &id in note_ids {
            let allowed = state
                .notes
                .get(&id)
                .is_some_and(|n| n.row.owner_id == owner_id || n.row.is_public);
            if !allowed {
                return Err(Error::Forbidden(
                    "order contains notes that are neither yours nor public".to_string(),
                ));
            }
        }
        state.orders.insert(owner_id, note_ids.to_vec());
        Ok(())
    }
}

#[async_trait]
impl LayoutRepository for MemBackend {
    async fn get(&self, owner_id: i64, key: &str) -> Result<Option<GraphLayout>> {
        Ok(self
            .lock()
            .layouts
            .get(&(owner_id, key.to_string()))
            .cloned())
    }

    async fn upsert(&self, owner_id: i64, key: &str, layout: &GraphLayout) -> Result<()> {
        self.lock()
            .layouts
            .insert((owner_id, key.to_string()), layout.clone());
        Ok(())
    }
}
