//! Outbound replies via teloxide `Bot` (send-only, no dispatcher).

use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::debug;

use crate::commands::{Messenger, MessengerError};

/// Sends command replies through the Bot API.
#[derive(Debug, Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    /// Create a messenger for `token` talking to `host`.
    ///
    /// # Errors
    ///
    /// Returns an error if `host` does not form a valid URL.
    pub fn new(host: &str, token: &str) -> Result<Self, url::ParseError> {
        let api_url = url::Url::parse(&format!("https://{}", host.trim_end_matches('/')))?;
        Ok(Self {
            bot: Bot::new(token).set_api_url(api_url),
        })
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), MessengerError> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map_err(|e| MessengerError::Send(e.to_string()))?;
        debug!(chat_id, "sent Telegram message");
        Ok(())
    }
}
