//! Core data models and transfer representations.

use std::collections::HashMap;

use braid_crypto::Sealed;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Title used when a note is created with a blank or missing title.
pub const DEFAULT_NOTE_TITLE: &str = "Untitled note";

/// Maximum number of backlinks returned per query.
pub const BACKLINK_LIMIT: i64 = 50;

/// Maximum length of a graph-node excerpt, in characters.
pub const EXCERPT_LEN: usize = 180;

/// Maximum number of position/collapsed entries in a persisted layout.
pub const LAYOUT_MAX_ENTRIES: usize = 5000;

/// Maximum length of a layout key.
pub const LAYOUT_KEY_MAX_LEN: usize = 128;

/// Serde helpers for the wire contract's `0|1` integer flags.
pub mod int_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
        Ok(u8::deserialize(de)? != 0)
    }

    pub mod opt {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<bool>, ser: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => ser.serialize_u8(u8::from(*v)),
                None => ser.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<bool>, D::Error> {
            Ok(Option::<u8>::deserialize(de)?.map(|v| v != 0))
        }
    }
}

/// A user identity.
///
/// The password hash is opaque to this core (owned by the excluded auth
/// layer); the wrapped per-user key lives in its own storage column set and
/// is fetched separately via `UserRepository::key_envelope`.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A note as stored: plaintext title, encrypted content.
///
/// `content` is decryptable with exactly one key, selected by `is_public` at
/// the time of the last write - the master key for public notes, the owner's
/// unwrapped key for private ones.
#[derive(Debug, Clone)]
pub struct StoredNote {
    pub id: i64,
    pub owner_id: i64,
    /// Owner's username, joined in for presentation.
    pub author: String,
    pub title: String,
    pub is_public: bool,
    pub content: Sealed,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a note update: the new row plus the pre-update visibility,
/// needed to decide whether a broadcast is due.
#[derive(Debug, Clone)]
pub struct NoteUpdate {
    pub note: StoredNote,
    pub was_public: bool,
}

/// Request for creating a new note.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateNoteRequest {
    pub title: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_public: bool,
}

/// Request for updating an existing note.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateNoteRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_public: bool,
}

/// Decrypted note transfer representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotePayload {
    pub id: i64,
    pub title: String,
    #[serde(with = "int_flag")]
    pub is_public: bool,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Present in requester-scoped listings: whether the requester owns this note.
    #[serde(
        default,
        with = "int_flag::opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub owned: Option<bool>,
}

/// One entry in a backlink listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacklinkEntry {
    pub id: i64,
    pub title: String,
    pub author: String,
    #[serde(with = "int_flag")]
    pub is_public: bool,
    pub updated_at: DateTime<Utc>,
}

/// Directed reference edge: `from`'s content references `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: i64,
    pub to: i64,
}

/// A graph node with its presentation excerpt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: i64,
    pub title: String,
    #[serde(with = "int_flag")]
    pub is_public: bool,
    pub author: String,
    #[serde(with = "int_flag")]
    pub owned: bool,
    pub excerpt: String,
}

/// Graph query result: visible nodes plus edges whose both endpoints are visible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphPayload {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Sort mode for the combined feed listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedSort {
    /// Explicit per-owner order first, then recency. Falls back to `Date`
    /// for anonymous requesters.
    #[default]
    Custom,
    /// Most recently updated first.
    Date,
    /// Title ascending, recency as tiebreaker.
    Title,
}

impl FeedSort {
    /// Parse a query-string sort mode; unrecognized values fall back to `Custom`.
    pub fn parse(s: &str) -> Self {
        match s {
            "date" => FeedSort::Date,
            "title" => FeedSort::Title,
            _ => FeedSort::Custom,
        }
    }
}

/// A 2D node position in a persisted graph layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Opaque client layout state, validated only for size and shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphLayout {
    /// Node positions keyed by decimal note id.
    pub positions: HashMap<String, Position>,
    /// Ids of nodes whose subtree the client has collapsed.
    #[serde(default)]
    pub collapsed: Vec<i64>,
}

impl GraphLayout {
    /// Validate size and shape. Malformed payloads are rejected wholesale -
    /// no partial acceptance.
    pub fn validate(&self) -> Result<()> {
        if self.positions.len() > LAYOUT_MAX_ENTRIES {
            return Err(Error::InvalidInput("too many nodes in layout".to_string()));
        }
        for (id, p) in &self.positions {
            if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::InvalidInput(format!("bad node id: {id:?}")));
            }
            if !p.x.is_finite() || !p.y.is_finite() {
                return Err(Error::InvalidInput(format!("bad position for node {id}")));
            }
        }
        if self.collapsed.len() > LAYOUT_MAX_ENTRIES {
            return Err(Error::InvalidInput("too many collapsed nodes".to_string()));
        }
        if self.collapsed.iter().any(|&id| id <= 0) {
            return Err(Error::InvalidInput("bad collapsed node id".to_string()));
        }
        Ok(())
    }
}

/// Normalize a layout key: trimmed, capped, defaulting to "all".
pub fn normalize_layout_key(key: Option<&str>) -> String {
    let key = key.unwrap_or("all").trim();
    let key = if key.is_empty() { "all" } else { key };
    key.chars().take(LAYOUT_KEY_MAX_LEN).collect()
}
