//! Core types and traits for braid.
//!
//! This crate contains the shared data models, error types, repository
//! traits, link-graph algorithms, and the live event hub. It has no storage
//! backend of its own; `braid-db` implements the repository traits on
//! PostgreSQL and `braid-service` composes everything into the note,
//! ordering, and graph services.

pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod logging;
pub mod models;
pub mod traits;

pub use config::Config;
pub use error::{Error, Result};
pub use events::{Event, EventHub, Subscription};
pub use graph::{children_index, connected_components, extract_references, subtree_sizes};
pub use models::*;
pub use traits::*;
