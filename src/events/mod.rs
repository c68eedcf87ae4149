//! Source-agnostic event model and the Fetch/Process contract.
//!
//! Adapters translate their native updates into [`Event`]s and hand them out
//! through [`Fetcher`]. A [`Processor`] consumes one event at a time. The
//! [`crate::consumer::Consumer`] ties the two together.

use async_trait::async_trait;
use thiserror::Error;

use crate::commands::CommandError;

// ---------------------------------------------------------------------------
// Event model
// ---------------------------------------------------------------------------

/// Event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// An update the adapter could not map to anything actionable.
    Unknown,
    /// A textual message.
    Message,
}

impl EventKind {
    /// Short lowercase name used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Message => "message",
        }
    }
}

/// Metadata for a message received through the Telegram adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramMeta {
    /// Chat to reply into.
    pub chat_id: i64,
    /// Key the sender's pages are stored under: the Telegram username, or
    /// `user:<id>` for accounts without one, or `chat:<id>` when the update
    /// names no sender at all.
    pub user_name: String,
    /// Numeric sender id, absent for channel posts.
    pub user_id: Option<i64>,
}

/// Metadata for a line read by the local CLI adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliMeta {
    /// Local user the line is attributed to.
    pub user_name: String,
}

/// Adapter-owned metadata carried by a message event.
///
/// Each adapter produces exactly one variant. Processors match on the
/// variant they understand and reject the rest with
/// [`ProcessError::UnknownMetaType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Meta {
    /// Produced by [`crate::telegram::source::TelegramSource`].
    Telegram(TelegramMeta),
    /// Produced by [`crate::cli::StdinSource`].
    Cli(CliMeta),
}

impl Meta {
    /// Name of the adapter that owns this metadata shape.
    pub fn adapter(&self) -> &'static str {
        match self {
            Self::Telegram(_) => "telegram",
            Self::Cli(_) => "cli",
        }
    }
}

/// Normalized event handed from a source adapter to a processor.
///
/// Metadata exists only on messages, so an `Unknown` event can never
/// carry a stale or foreign `Meta`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Update without a textual body.
    Unknown,
    /// Textual message with its adapter metadata.
    Message {
        /// Message body.
        text: String,
        /// Sender/destination metadata.
        meta: Meta,
    },
}

impl Event {
    /// Event classification.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Unknown => EventKind::Unknown,
            Self::Message { .. } => EventKind::Message,
        }
    }

    /// Text payload, empty for `Unknown`.
    pub fn text(&self) -> &str {
        match self {
            Self::Unknown => "",
            Self::Message { text, .. } => text,
        }
    }

    /// Metadata, present only for messages.
    pub fn meta(&self) -> Option<&Meta> {
        match self {
            Self::Unknown => None,
            Self::Message { meta, .. } => Some(meta),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure while pulling events from an upstream source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The upstream call failed. The adapter cursor was not moved.
    #[error("can't get events from {adapter}: {source}")]
    Upstream {
        /// Adapter that issued the call.
        adapter: &'static str,
        /// Underlying transport or API failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Failure while processing a single event.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The processor has no handler for this event kind.
    #[error("can't process event: unknown event type ({0})")]
    UnknownEventType(&'static str),

    /// A message carried metadata from a different adapter.
    #[error("can't process message: unknown meta type (expected {expected}, got {actual})")]
    UnknownMetaType {
        /// Adapter the processor is bound to.
        expected: &'static str,
        /// Adapter that produced the metadata.
        actual: &'static str,
    },

    /// The command handler failed.
    #[error("can't process message: {0}")]
    Command(#[from] CommandError),
}

impl ProcessError {
    /// Whether trying the same event again could succeed.
    ///
    /// Unknown kinds and foreign metadata fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Command(_))
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Source side of the contract: hands out bounded batches of new events.
///
/// `fetch` takes `&mut self` because it advances the adapter's cursor.
///
/// `fetch` must be cancel safe: dropping the future before it resolves
/// leaves the cursor where it was. Adapters therefore advance the cursor
/// only after their last await point, and defer durable writes to
/// [`Fetcher::commit`].
#[async_trait]
pub trait Fetcher: Send {
    /// Fetch up to `limit` new events in upstream order.
    ///
    /// An empty vector means nothing new, not a fault.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Upstream`] when the upstream call fails; the
    /// cursor is left untouched in that case.
    async fn fetch(&mut self, limit: usize) -> Result<Vec<Event>, FetchError>;

    /// Called once every event of the last fetched batch has been handed to
    /// the processor. Adapters with a durable cursor checkpoint it here.
    async fn commit(&mut self) {}
}

/// Sink side of the contract: handles one event at a time.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Dispatch a single event.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] describing why the event was not handled.
    async fn process(&self, event: &Event) -> Result<(), ProcessError>;
}
