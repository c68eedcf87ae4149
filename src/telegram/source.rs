//! Telegram source adapter: turns `getUpdates` batches into [`Event`]s.
//!
//! The adapter owns the update cursor. Every successful non-empty fetch moves
//! it past the highest update id seen, so the next request never re-delivers
//! an update this instance already returned. Failed fetches leave it alone.
//! The checkpoint is only written on commit, once the batch has been
//! processed, so a crash mid-batch redelivers rather than skips.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::client::{Update, UpdatesClient, User};
use crate::config::CursorRecovery;
use crate::events::{Event, FetchError, Fetcher, Meta, TelegramMeta};
use crate::storage::{CursorStore, StorageError};

/// Adapter name used for log fields and cursor checkpoints.
pub const ADAPTER: &str = "telegram";

/// Source adapter over any [`UpdatesClient`].
pub struct TelegramSource<C> {
    client: C,
    offset: i64,
    checkpoint: Option<Arc<dyn CursorStore>>,
    // Last offset known to be in the checkpoint store.
    saved: Option<i64>,
}

impl<C> std::fmt::Debug for TelegramSource<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSource")
            .field("offset", &self.offset)
            .field("checkpoint", &self.checkpoint.is_some())
            .finish_non_exhaustive()
    }
}

impl<C: UpdatesClient> TelegramSource<C> {
    /// Create an adapter starting at offset zero with no checkpoint.
    pub fn new(client: C) -> Self {
        Self {
            client,
            offset: 0,
            checkpoint: None,
            saved: None,
        }
    }

    /// Create an adapter that resumes from, and keeps saving to, `store`.
    ///
    /// A missing checkpoint starts at zero. A checkpoint that cannot be read
    /// is handled according to `recovery`.
    ///
    /// # Errors
    ///
    /// Returns the storage error when loading fails and `recovery` is
    /// [`CursorRecovery::FailFast`].
    pub async fn restore(
        client: C,
        store: Arc<dyn CursorStore>,
        recovery: CursorRecovery,
    ) -> Result<Self, StorageError> {
        let (offset, saved) = match store.load_cursor(ADAPTER).await {
            Ok(Some(offset)) => {
                info!(offset, "restored Telegram cursor from checkpoint");
                (offset.max(0), Some(offset))
            }
            Ok(None) => {
                info!("no Telegram cursor checkpoint, starting from zero");
                (0, None)
            }
            Err(e) => match recovery {
                CursorRecovery::StartFromZero => {
                    warn!(error = %e, "failed to load Telegram cursor, starting from zero");
                    (0, None)
                }
                CursorRecovery::FailFast => return Err(e),
            },
        };

        Ok(Self {
            client,
            offset,
            checkpoint: Some(store),
            saved,
        })
    }

    /// Offset the next `getUpdates` call will request from.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Persist the cursor if it moved since the last save (best-effort).
    ///
    /// A failed write is retried on the next commit.
    async fn save_checkpoint(&mut self) {
        let Some(store) = &self.checkpoint else {
            return;
        };
        if self.saved == Some(self.offset) {
            return;
        }
        match store.save_cursor(ADAPTER, self.offset).await {
            Ok(()) => self.saved = Some(self.offset),
            Err(e) => {
                warn!(error = %e, offset = self.offset, "failed to persist Telegram cursor (best-effort)");
            }
        }
    }
}

#[async_trait]
impl<C: UpdatesClient> Fetcher for TelegramSource<C> {
    async fn fetch(&mut self, limit: usize) -> Result<Vec<Event>, FetchError> {
        let updates = self
            .client
            .updates(self.offset, limit)
            .await
            .map_err(|e| FetchError::Upstream {
                adapter: ADAPTER,
                source: Box::new(e),
            })?;

        let Some(max_id) = updates.iter().map(|u| u.id).max() else {
            return Ok(Vec::new());
        };

        let events: Vec<Event> = updates.iter().map(translate).collect();

        // No await past this point: a cancelled fetch never moves the cursor.
        self.offset = self.offset.max(max_id.saturating_add(1));
        debug!(count = events.len(), offset = self.offset, "fetched Telegram updates");

        Ok(events)
    }

    async fn commit(&mut self) {
        self.save_checkpoint().await;
    }
}

/// Translate a Telegram update into an [`Event`].
///
/// Updates without a message, or with a message that has no text, become
/// [`Event::Unknown`].
pub fn translate(update: &Update) -> Event {
    let Some(message) = &update.message else {
        return Event::Unknown;
    };
    let Some(text) = &message.text else {
        return Event::Unknown;
    };

    let user_name = match &message.from {
        Some(User {
            username: Some(name),
            ..
        }) if !name.is_empty() => name.clone(),
        // Telegram usernames never contain ':', so these keys cannot collide
        // with a real one.
        Some(user) => format!("user:{}", user.id),
        None => format!("chat:{}", message.chat.id),
    };

    Event::Message {
        text: text.clone(),
        meta: Meta::Telegram(TelegramMeta {
            chat_id: message.chat.id,
            user_name,
            user_id: message.from.as_ref().map(|u| u.id),
        }),
    }
}
