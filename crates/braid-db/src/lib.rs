//! # braid-db
//!
//! PostgreSQL storage layer for braid.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for users, notes, link edges, explicit
//!   ordering, and graph layouts
//!
//! Content arrives and leaves sealed; this layer never sees plaintext note
//! content or unwrapped keys.
//!
//! ## Example
//!
//! ```rust,ignore
//! use braid_db::Database;
//! use braid_core::NoteRepository;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/braid").await?;
//!     let note = db.notes.fetch_visible(42, None).await?;
//!     println!("note {} is public: {}", note.id, note.is_public);
//!     Ok(())
//! }
//! ```

pub mod layouts;
pub mod links;
pub mod notes;
pub mod ordering;
pub mod pool;
pub mod users;

// Test fixtures for integration tests
// Note: always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use braid_core::*;

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

// Re-export repository implementations
pub use layouts::PgLayoutRepository;
pub use links::PgLinkRepository;
pub use notes::PgNoteRepository;
pub use ordering::PgOrderRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use users::PgUserRepository;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// User repository.
    pub users: PgUserRepository,
    /// Note repository for CRUD and listings.
    pub notes: PgNoteRepository,
    /// Link repository for the derived reference graph.
    pub links: PgLinkRepository,
    /// Order repository for explicit per-owner ordering.
    pub orders: PgOrderRepository,
    /// Layout repository for persisted graph layouts.
    pub layouts: PgLayoutRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            users: PgUserRepository::new(pool.clone()),
            notes: PgNoteRepository::new(pool.clone()),
            links: PgLinkRepository::new(pool.clone()),
            orders: PgOrderRepository::new(pool.clone()),
            layouts: PgLayoutRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    /// Log pool health metrics.
    pub fn log_metrics(&self) {
        log_pool_metrics(&self.pool);
    }
}
