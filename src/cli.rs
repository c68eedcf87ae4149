//! Local CLI adapter: stdin lines in, stdout replies out.
//!
//! Used by `urlminder local` to exercise the command handler without a
//! Telegram bot. Every line of input becomes one event attributed to a
//! single local user.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use crate::commands::{Commander, Messenger, MessengerError};
use crate::events::{CliMeta, Event, FetchError, Fetcher, Meta, ProcessError, Processor};

/// Adapter name used for log fields and metadata checks.
pub const ADAPTER: &str = "cli";

/// Chat id used for every local reply.
pub const LOCAL_CHAT_ID: i64 = 0;

/// Source reading one event per line from an async reader.
///
/// Each fetch returns at most one line, so interactive input is handed to
/// the processor as soon as it is typed. The cursor counts consumed lines.
pub struct StdinSource<R> {
    reader: R,
    user_name: String,
    line: i64,
    eof: bool,
    on_eof: Option<watch::Sender<bool>>,
}

impl<R> std::fmt::Debug for StdinSource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdinSource")
            .field("user_name", &self.user_name)
            .field("line", &self.line)
            .field("eof", &self.eof)
            .finish_non_exhaustive()
    }
}

impl<R: AsyncBufRead + Unpin + Send> StdinSource<R> {
    /// Create a source attributing every line to `user_name`.
    pub fn new(reader: R, user_name: impl Into<String>) -> Self {
        Self {
            reader,
            user_name: user_name.into(),
            line: 0,
            eof: false,
            on_eof: None,
        }
    }

    /// Signal `shutdown` once the input is exhausted.
    pub fn with_shutdown_on_eof(mut self, shutdown: watch::Sender<bool>) -> Self {
        self.on_eof = Some(shutdown);
        self
    }

    /// Number of lines consumed so far.
    pub fn offset(&self) -> i64 {
        self.line
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> Fetcher for StdinSource<R> {
    async fn fetch(&mut self, limit: usize) -> Result<Vec<Event>, FetchError> {
        if self.eof || limit == 0 {
            return Ok(Vec::new());
        }

        let mut buf = String::new();
        let read = self
            .reader
            .read_line(&mut buf)
            .await
            .map_err(|e| FetchError::Upstream {
                adapter: ADAPTER,
                source: Box::new(e),
            })?;

        if read == 0 {
            info!(lines = self.line, "end of input");
            self.eof = true;
            if let Some(tx) = &self.on_eof {
                // No receivers left means the loop is already gone.
                let _ = tx.send(true);
            }
            return Ok(Vec::new());
        }

        self.line = self.line.saturating_add(1);
        let text = buf.trim_end_matches(['\r', '\n']);
        debug!(line = self.line, "read input line");

        if text.trim().is_empty() {
            return Ok(vec![Event::Unknown]);
        }
        Ok(vec![Event::Message {
            text: text.to_owned(),
            meta: Meta::Cli(CliMeta {
                user_name: self.user_name.clone(),
            }),
        }])
    }
}

/// Processor bound to events produced by [`StdinSource`].
#[derive(Debug, Clone)]
pub struct CliProcessor {
    commander: Commander,
}

impl CliProcessor {
    /// Create a processor that dispatches to `commander`.
    pub fn new(commander: Commander) -> Self {
        Self { commander }
    }
}

#[async_trait]
impl Processor for CliProcessor {
    async fn process(&self, event: &Event) -> Result<(), ProcessError> {
        match event {
            Event::Message {
                text,
                meta: Meta::Cli(meta),
            } => {
                self.commander
                    .handle(text, LOCAL_CHAT_ID, &meta.user_name)
                    .await?;
                Ok(())
            }
            Event::Message { meta, .. } => Err(ProcessError::UnknownMetaType {
                expected: ADAPTER,
                actual: meta.adapter(),
            }),
            other => Err(ProcessError::UnknownEventType(other.kind().as_str())),
        }
    }
}

/// Messenger writing each reply followed by a blank line.
pub struct LineMessenger<W> {
    writer: Mutex<W>,
}

impl<W> std::fmt::Debug for LineMessenger<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineMessenger").finish_non_exhaustive()
    }
}

impl LineMessenger<tokio::io::Stdout> {
    /// Messenger printing to the process stdout.
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin + Send> LineMessenger<W> {
    /// Wrap `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Messenger for LineMessenger<W> {
    async fn send_message(&self, _chat_id: i64, text: &str) -> Result<(), MessengerError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(text.as_bytes()).await?;
        writer.write_all(b"\n\n").await?;
        writer.flush().await?;
        Ok(())
    }
}
