//! SQLite-backed storage for saved pages and adapter cursors.
//!
//! The schema is applied inline via `include_str!` every time the database is
//! opened; all statements are idempotent.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use super::{CursorStore, Page, Storage, StorageError};

/// Schema applied on open.
const SCHEMA: &str = include_str!("../../migrations/001_schema.sql");

/// Raw row tuple from the `pages` table.
type PageRow = (String, String, String);

/// SQLite storage shared by the command handler and the cursor checkpoint.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created, the
    /// database cannot be opened, or the schema fails to apply.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .pragma("trusted_schema", "OFF");

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        let storage = Self::with_pool(pool).await?;
        info!(path = %path.display(), "storage opened");
        Ok(storage)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema fails to apply.
    pub async fn open_in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);
        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn save(&self, page: &Page) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO pages (user_name, url, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_name, url) DO NOTHING",
        )
        .bind(&page.user_name)
        .bind(&page.url)
        .bind(page.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pick_random(&self, user_name: &str) -> Result<Option<Page>, StorageError> {
        let row: Option<PageRow> = sqlx::query_as(
            "SELECT url, user_name, created_at FROM pages
             WHERE user_name = ?1
             ORDER BY RANDOM()
             LIMIT 1",
        )
        .bind(user_name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(page_from_row).transpose()
    }

    async fn remove(&self, page: &Page) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM pages WHERE user_name = ?1 AND url = ?2")
            .bind(&page.user_name)
            .bind(&page.url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_exists(&self, page: &Page) -> Result<bool, StorageError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM pages WHERE user_name = ?1 AND url = ?2")
                .bind(&page.user_name)
                .bind(&page.url)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn list(&self, user_name: &str, limit: usize) -> Result<Vec<Page>, StorageError> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<PageRow> = sqlx::query_as(
            "SELECT url, user_name, created_at FROM pages
             WHERE user_name = ?1
             ORDER BY id ASC
             LIMIT ?2",
        )
        .bind(user_name)
        .bind(limit_i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(page_from_row).collect()
    }

    async fn count(&self) -> Result<u64, StorageError> {
        let row: (i64,) = sqlx::query_as("SELECT count(*) FROM pages")
            .fetch_one(&self.pool)
            .await?;
        // count(*) is never negative.
        Ok(u64::try_from(row.0).unwrap_or(0))
    }
}

#[async_trait]
impl CursorStore for SqliteStorage {
    async fn load_cursor(&self, adapter: &str) -> Result<Option<i64>, StorageError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT cursor FROM adapter_state WHERE adapter = ?1")
                .bind(adapter)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(cursor,)| cursor))
    }

    async fn save_cursor(&self, adapter: &str, offset: i64) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO adapter_state (adapter, cursor, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(adapter) DO UPDATE SET cursor = excluded.cursor, updated_at = excluded.updated_at",
        )
        .bind(adapter)
        .bind(offset)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Convert a raw `pages` row into a [`Page`].
fn page_from_row(row: PageRow) -> Result<Page, StorageError> {
    let (url, user_name, created_at) = row;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| StorageError::InvalidTimestamp {
            value: created_at.clone(),
            source,
        })?;
    Ok(Page {
        url,
        user_name,
        created_at,
    })
}
