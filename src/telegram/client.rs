//! Minimal Telegram Bot API client for `getUpdates`.
//!
//! Only the fields the source adapter reads are deserialized; everything
//! else in the update payload is ignored.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Default Bot API host.
pub const DEFAULT_HOST: &str = "api.telegram.org";

/// Largest `limit` Telegram accepts for `getUpdates`.
pub const MAX_UPDATES_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Telegram client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The Telegram API returned an error response.
    #[error("Telegram API error: {0}")]
    Api(String),
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response body was not a valid Bot API envelope.
    #[error("malformed Telegram response: {0}")]
    Decode(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Telegram API types (minimal subset)
// ---------------------------------------------------------------------------

/// Generic Telegram Bot API response wrapper.
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Telegram `Update` object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Update {
    /// Monotonically increasing update identifier.
    #[serde(rename = "update_id")]
    pub id: i64,
    /// New incoming message, if this update carries one.
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

/// Telegram `Message` object (subset of fields we use).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IncomingMessage {
    /// Text body; absent for stickers, photos, and so on.
    #[serde(default)]
    pub text: Option<String>,
    /// Sender; absent for channel posts.
    #[serde(default)]
    pub from: Option<User>,
    /// Conversation the message belongs to.
    pub chat: Chat,
}

/// Telegram `User` object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    /// Stable numeric user identifier.
    pub id: i64,
    /// Public username without the leading `@`.
    #[serde(default)]
    pub username: Option<String>,
}

/// Telegram `Chat` object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Chat {
    /// Chat identifier.
    pub id: i64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Upstream contract the source adapter depends on.
#[async_trait]
pub trait UpdatesClient: Send + Sync {
    /// Return up to `limit` updates with identifiers `>= offset`, in order.
    async fn updates(&self, offset: i64, limit: usize) -> Result<Vec<Update>, ClientError>;
}

/// `reqwest`-backed Bot API client.
pub struct TelegramClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // base_url embeds the bot token.
        f.debug_struct("TelegramClient")
            .field("base_url", &"__REDACTED__")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TelegramClient {
    /// Create a client for `host` authenticated with `token`.
    pub fn new(host: &str, token: &str, timeout: Duration) -> Self {
        Self {
            base_url: bot_base_url(host, token),
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

/// Build `https://{host}/bot{token}`.
fn bot_base_url(host: &str, token: &str) -> String {
    format!("https://{}/bot{}", host.trim_end_matches('/'), token)
}

#[async_trait]
impl UpdatesClient for TelegramClient {
    async fn updates(&self, offset: i64, limit: usize) -> Result<Vec<Update>, ClientError> {
        let url = format!("{}/getUpdates", self.base_url);
        let limit = limit.min(MAX_UPDATES_LIMIT);

        let resp = self
            .client
            .get(&url)
            .query(&[("offset", offset.to_string()), ("limit", limit.to_string())])
            .timeout(self.timeout)
            .send()
            .await?;

        let body = resp.text().await?;
        let response: TelegramResponse<Vec<Update>> = serde_json::from_str(&body)?;
        let updates = parse_response(response)?;
        debug!(offset, limit, count = updates.len(), "getUpdates returned");
        Ok(updates)
    }
}

/// Unwrap the Bot API envelope.
fn parse_response<T: Default>(response: TelegramResponse<T>) -> Result<T, ClientError> {
    if !response.ok {
        return Err(ClientError::Api(
            response
                .description
                .unwrap_or_else(|| "unknown error".to_owned()),
        ));
    }
    Ok(response.result.unwrap_or_default())
}
