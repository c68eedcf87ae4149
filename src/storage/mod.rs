//! Saved-page storage and adapter cursor checkpoints.
//!
//! [`Storage`] is what the command handler talks to. [`CursorStore`] lets a
//! source adapter survive restarts without re-reading (or losing) updates.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use self::memory::MemoryStorage;
pub use self::sqlite::SqliteStorage;

/// A page a user asked to be reminded about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Saved URL.
    pub url: String,
    /// Owner of the page.
    pub user_name: String,
    /// When the page was saved.
    pub created_at: DateTime<Utc>,
}

impl Page {
    /// Create a page stamped with the current time.
    pub fn new(url: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_name: user_name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp {value:?}: {source}")]
    InvalidTimestamp {
        /// Raw column value.
        value: String,
        /// Parser error.
        #[source]
        source: chrono::ParseError,
    },

    /// Filesystem error while preparing the database location.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistent collection of saved pages.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Save a page. Saving an existing (user, url) pair is a no-op.
    async fn save(&self, page: &Page) -> Result<(), StorageError>;

    /// Pick a random page saved by `user_name`, if any.
    async fn pick_random(&self, user_name: &str) -> Result<Option<Page>, StorageError>;

    /// Remove a page.
    async fn remove(&self, page: &Page) -> Result<(), StorageError>;

    /// Whether the user already saved this URL.
    async fn is_exists(&self, page: &Page) -> Result<bool, StorageError>;

    /// Up to `limit` pages saved by `user_name`, oldest first.
    async fn list(&self, user_name: &str, limit: usize) -> Result<Vec<Page>, StorageError>;

    /// Total number of saved pages across all users.
    async fn count(&self) -> Result<u64, StorageError>;
}

/// Checkpoint store for source adapter cursors.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Load the last saved cursor for `adapter`.
    async fn load_cursor(&self, adapter: &str) -> Result<Option<i64>, StorageError>;

    /// Persist `offset` as the cursor for `adapter`.
    async fn save_cursor(&self, adapter: &str, offset: i64) -> Result<(), StorageError>;
}
