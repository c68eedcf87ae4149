//! In-process storage used by `local --in-memory` runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rand::seq::SliceRandom;

use super::{CursorStore, Page, Storage, StorageError};

/// Volatile storage. Everything is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    pages: Mutex<Vec<Page>>,
    cursors: Mutex<HashMap<String, i64>>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

// A poisoned lock only means another task panicked mid-update; the data is
// plain values, so keep serving it.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save(&self, page: &Page) -> Result<(), StorageError> {
        let mut pages = lock(&self.pages);
        if !pages
            .iter()
            .any(|p| p.user_name == page.user_name && p.url == page.url)
        {
            pages.push(page.clone());
        }
        Ok(())
    }

    async fn pick_random(&self, user_name: &str) -> Result<Option<Page>, StorageError> {
        let pages = lock(&self.pages);
        let owned: Vec<&Page> = pages.iter().filter(|p| p.user_name == user_name).collect();
        Ok(owned.choose(&mut rand::thread_rng()).map(|p| (*p).clone()))
    }

    async fn remove(&self, page: &Page) -> Result<(), StorageError> {
        lock(&self.pages).retain(|p| !(p.user_name == page.user_name && p.url == page.url));
        Ok(())
    }

    async fn is_exists(&self, page: &Page) -> Result<bool, StorageError> {
        Ok(lock(&self.pages)
            .iter()
            .any(|p| p.user_name == page.user_name && p.url == page.url))
    }

    async fn list(&self, user_name: &str, limit: usize) -> Result<Vec<Page>, StorageError> {
        Ok(lock(&self.pages)
            .iter()
            .filter(|p| p.user_name == user_name)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64, StorageError> {
        Ok(u64::try_from(lock(&self.pages).len()).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl CursorStore for MemoryStorage {
    async fn load_cursor(&self, adapter: &str) -> Result<Option<i64>, StorageError> {
        Ok(lock(&self.cursors).get(adapter).copied())
    }

    async fn save_cursor(&self, adapter: &str, offset: i64) -> Result<(), StorageError> {
        lock(&self.cursors).insert(adapter.to_owned(), offset);
        Ok(())
    }
}
