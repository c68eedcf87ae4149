//! Text command handling for saved pages.
//!
//! The [`Commander`] receives `(text, chat_id, user_name)` from a processor,
//! performs the matching storage action, and replies through a
//! [`Messenger`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

use crate::storage::{Page, Storage, StorageError};

/// Maximum number of pages shown by `/list`.
pub const LIST_LIMIT: usize = 20;

/// Reply for `/help`.
pub const MSG_HELP: &str = "I can save and keep your pages. I can also offer them to you to read.\n\n\
In order to save a page, just send me a link to it (or /add <link>).\n\n\
In order to get a random page from your list, send me /rnd.\n\
Caution! After that, this page will be removed from your list!\n\n\
Send /list to see what you have saved.";

/// Greeting prepended to the help text for `/start`.
pub const MSG_HELLO: &str = "Hi there!";

/// Reply for unrecognised input.
pub const MSG_UNKNOWN_COMMAND: &str = "Unknown command";

/// Reply when the user has nothing saved.
pub const MSG_NO_SAVED_PAGES: &str = "You have no saved pages";

/// Reply after a successful save.
pub const MSG_SAVED: &str = "Saved!";

/// Reply when the page is already stored.
pub const MSG_ALREADY_EXISTS: &str = "You already have this page in your list";

/// Outbound reply channel.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send `text` to `chat_id`.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), MessengerError>;
}

/// Errors from sending replies.
#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    /// The messaging API rejected or failed the request.
    #[error("can't send message: {0}")]
    Send(String),
    /// Writing to a local stream failed.
    #[error("can't write reply: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from command execution.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Storage operation failed.
    #[error("can't do command: {0}")]
    Storage(#[from] StorageError),
    /// Reply could not be delivered.
    #[error("can't do command: {0}")]
    Reply(#[from] MessengerError),
}

/// Parsed user command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/start`.
    Start,
    /// `/help`.
    Help,
    /// `/rnd`.
    Random,
    /// `/list`.
    List,
    /// `/add <url>` or a bare URL.
    Add(String),
    /// Anything else.
    Unknown,
}

impl Command {
    /// Parse a message body. Surrounding whitespace is ignored and a
    /// `@botname` suffix on the command word is stripped.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();

        if is_url(text) {
            return Self::Add(text.to_owned());
        }

        let Some(without_slash) = text.strip_prefix('/') else {
            return Self::Unknown;
        };
        let (word, args) = match without_slash.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (without_slash, ""),
        };
        let word = word.split('@').next().unwrap_or(word);

        match word {
            "start" => Self::Start,
            "help" => Self::Help,
            "rnd" => Self::Random,
            "list" => Self::List,
            "add" if is_url(args) => Self::Add(args.to_owned()),
            _ => Self::Unknown,
        }
    }
}

/// Whether `text` is an absolute http(s) URL with a host.
fn is_url(text: &str) -> bool {
    match Url::parse(text) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// Executes commands against storage and replies through a messenger.
#[derive(Clone)]
pub struct Commander {
    storage: Arc<dyn Storage>,
    messenger: Arc<dyn Messenger>,
}

impl std::fmt::Debug for Commander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commander").finish_non_exhaustive()
    }
}

impl Commander {
    /// Create a commander.
    pub fn new(storage: Arc<dyn Storage>, messenger: Arc<dyn Messenger>) -> Self {
        Self { storage, messenger }
    }

    /// Handle one message from `user_name` in `chat_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when storage or the reply fails.
    pub async fn handle(
        &self,
        text: &str,
        chat_id: i64,
        user_name: &str,
    ) -> Result<(), CommandError> {
        let command = Command::parse(text);
        info!(user_name, chat_id, command = ?command, "got new command");

        match command {
            Command::Start => self.reply(chat_id, &format!("{MSG_HELLO}\n\n{MSG_HELP}")).await,
            Command::Help => self.reply(chat_id, MSG_HELP).await,
            Command::Random => self.send_random(chat_id, user_name).await,
            Command::List => self.send_list(chat_id, user_name).await,
            Command::Add(url) => self.save_page(chat_id, &url, user_name).await,
            Command::Unknown => self.reply(chat_id, MSG_UNKNOWN_COMMAND).await,
        }
    }

    async fn save_page(&self, chat_id: i64, url: &str, user_name: &str) -> Result<(), CommandError> {
        let page = Page::new(url, user_name);

        if self.storage.is_exists(&page).await? {
            return self.reply(chat_id, MSG_ALREADY_EXISTS).await;
        }

        self.storage.save(&page).await?;
        debug!(user_name, url, "page saved");
        self.reply(chat_id, MSG_SAVED).await
    }

    async fn send_random(&self, chat_id: i64, user_name: &str) -> Result<(), CommandError> {
        let Some(page) = self.storage.pick_random(user_name).await? else {
            return self.reply(chat_id, MSG_NO_SAVED_PAGES).await;
        };

        self.reply(chat_id, &page.url).await?;
        // Removed only after the URL was delivered, so a failed send keeps it.
        self.storage.remove(&page).await?;
        Ok(())
    }

    async fn send_list(&self, chat_id: i64, user_name: &str) -> Result<(), CommandError> {
        let pages = self.storage.list(user_name, LIST_LIMIT).await?;
        if pages.is_empty() {
            return self.reply(chat_id, MSG_NO_SAVED_PAGES).await;
        }

        let mut lines = vec![format!("Saved pages ({}):", pages.len())];
        lines.extend(pages.iter().map(|p| format!("- {}", p.url)));
        self.reply(chat_id, &lines.join("\n")).await
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<(), CommandError> {
        self.messenger.send_message(chat_id, text).await?;
        Ok(())
    }
}
