//! Telegram processor: forwards Telegram messages to the command handler.

use async_trait::async_trait;
use tracing::debug;

use super::source::ADAPTER;
use crate::commands::Commander;
use crate::events::{Event, Meta, ProcessError, Processor, TelegramMeta};

/// Processor bound to events produced by the Telegram source.
#[derive(Debug, Clone)]
pub struct TelegramProcessor {
    commander: Commander,
}

impl TelegramProcessor {
    /// Create a processor that dispatches to `commander`.
    pub fn new(commander: Commander) -> Self {
        Self { commander }
    }
}

/// Extract Telegram metadata, rejecting any other adapter's shape.
fn telegram_meta(meta: &Meta) -> Result<&TelegramMeta, ProcessError> {
    match meta {
        Meta::Telegram(m) => Ok(m),
        other => Err(ProcessError::UnknownMetaType {
            expected: ADAPTER,
            actual: other.adapter(),
        }),
    }
}

#[async_trait]
impl Processor for TelegramProcessor {
    async fn process(&self, event: &Event) -> Result<(), ProcessError> {
        match event {
            Event::Message { text, meta } => {
                let meta = telegram_meta(meta)?;
                debug!(chat_id = meta.chat_id, "processing Telegram message");
                self.commander
                    .handle(text, meta.chat_id, &meta.user_name)
                    .await?;
                Ok(())
            }
            other => Err(ProcessError::UnknownEventType(other.kind().as_str())),
        }
    }
}
