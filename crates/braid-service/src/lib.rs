//! # braid-service
//!
//! Service layer for braid: note CRUD with envelope encryption, the derived
//! reference graph, explicit ordering, graph layouts, and live notification.
//!
//! Services hold repository trait objects, so they run against PostgreSQL
//! ([`braid_db`]) in production and the in-memory backend ([`testing`]) in
//! tests.
//!
//! ## Example
//!
//! ```rust,ignore
//! use braid_core::{Config, CreateNoteRequest};
//! use braid_service::Services;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let services = Services::connect(&config).await?;
//!     let user = services.vault.register_user("alice", "argon2-hash").await?;
//!     let note = services
//!         .notes
//!         .create(
//!             user.id,
//!             CreateNoteRequest {
//!                 title: Some("Plans".to_string()),
//!                 content: "see [[#12]]".to_string(),
//!                 is_public: false,
//!             },
//!         )
//!         .await?;
//!     println!("created note {}", note.id);
//!     Ok(())
//! }
//! ```

pub mod graph;
pub mod keys;
pub mod layouts;
pub mod notes;
pub mod ordering;
pub mod testing;

use std::sync::Arc;

use braid_core::{
    Config, EventHub, LayoutRepository, LinkRepository, NoteRepository, OrderRepository, Result,
    UserRepository,
};
use braid_crypto::MasterKey;

pub use graph::LinkGraph;
pub use keys::KeyVault;
pub use layouts::LayoutService;
pub use notes::NoteStore;
pub use ordering::OrderingService;

/// Repository handles a [`Services`] instance is assembled from.
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub notes: Arc<dyn NoteRepository>,
    pub links: Arc<dyn LinkRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub layouts: Arc<dyn LayoutRepository>,
}

/// The assembled service layer.
pub struct Services {
    pub vault: Arc<KeyVault>,
    pub notes: NoteStore,
    pub graph: LinkGraph,
    pub ordering: OrderingService,
    pub layouts: LayoutService,
    pub hub: Arc<EventHub>,
}

impl Services {
    /// Assemble services over the given repositories and event hub.
    pub fn new(master: MasterKey, repos: Repositories, hub: Arc<EventHub>) -> Self {
        let vault = Arc::new(KeyVault::new(master, repos.users));
        Self {
            notes: NoteStore::new(repos.notes, vault.clone(), hub.clone()),
            graph: LinkGraph::new(repos.links, vault.clone()),
            ordering: OrderingService::new(repos.orders, hub.clone()),
            layouts: LayoutService::new(repos.layouts),
            vault,
            hub,
        }
    }

    /// Assemble services over PostgreSQL repositories sharing one pool.
    pub fn postgres(config: &Config, pool: sqlx::PgPool) -> Self {
        let repos = Repositories {
            users: Arc::new(braid_db::PgUserRepository::new(pool.clone())),
            notes: Arc::new(braid_db::PgNoteRepository::new(pool.clone())),
            links: Arc::new(braid_db::PgLinkRepository::new(pool.clone())),
            orders: Arc::new(braid_db::PgOrderRepository::new(pool.clone())),
            layouts: Arc::new(braid_db::PgLayoutRepository::new(pool)),
        };
        let hub = Arc::new(EventHub::with_capacity(config.event_capacity));
        Self::new(config.master_key.clone(), repos, hub)
    }

    /// Connect to PostgreSQL and assemble services, with the keep-alive task
    /// running at the configured interval.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = braid_db::create_pool(&config.database_url).await?;
        let services = Self::postgres(config, pool);
        EventHub::spawn_keepalive(services.hub.clone(), config.keepalive);
        Ok(services)
    }
}
