//! Telegram adapter: `getUpdates` client, source, processor, and messenger.
//!
//! The source polls updates and owns the cursor. The processor hands
//! message events to the command handler. The messenger sends the replies.

pub mod client;
pub mod messenger;
pub mod processor;
pub mod source;

pub use self::client::{TelegramClient, UpdatesClient};
pub use self::messenger::TelegramMessenger;
pub use self::processor::TelegramProcessor;
pub use self::source::TelegramSource;
