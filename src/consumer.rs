//! Consumer loop: drives the fetch/process cycle of one source and one processor.
//!
//! Each iteration fetches a bounded batch and processes its events strictly
//! in order. A failed fetch backs off and retries. An empty batch idles
//! briefly. A failed event is logged and the batch moves on. Once a batch is
//! done the source is told to commit its cursor. The loop only stops on the
//! shutdown signal, which is observed during pauses, while a fetch is in
//! flight, and between batches.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::events::{Event, FetchError, Fetcher, ProcessError, Processor};

/// What to do when processing an event fails with a retryable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure and move to the next event.
    #[default]
    LogAndDrop,
    /// Re-run the event immediately, up to `max_attempts` tries in total.
    Retry {
        /// Total attempts including the first one.
        max_attempts: u32,
    },
}

impl FailurePolicy {
    fn max_attempts(self) -> u32 {
        match self {
            Self::LogAndDrop => 1,
            Self::Retry { max_attempts } => max_attempts.max(1),
        }
    }
}

/// Pacing and error-tolerance settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSettings {
    /// Maximum events requested per fetch.
    pub batch_size: usize,
    /// Pause after an empty batch.
    pub idle_interval: Duration,
    /// Pause after the first failed fetch.
    pub fetch_backoff: Duration,
    /// Upper bound for the fetch backoff. Equal to `fetch_backoff` for a
    /// fixed interval; larger values double the pause on each consecutive
    /// failure.
    pub max_fetch_backoff: Duration,
    /// Per-event failure handling.
    pub failure_policy: FailurePolicy,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            idle_interval: Duration::from_secs(1),
            fetch_backoff: Duration::from_secs(1),
            max_fetch_backoff: Duration::from_secs(1),
            failure_policy: FailurePolicy::LogAndDrop,
        }
    }
}

/// Outcome of processing one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Number of events in the batch.
    pub events: usize,
    /// Positions (0-based) of events that ultimately failed.
    pub failed: Vec<usize>,
}

/// Outcome of a single fetch/process cycle.
#[derive(Debug)]
pub enum Step {
    /// The fetch succeeded but there was nothing new.
    Idle,
    /// The fetch failed; the source cursor did not move.
    FetchFailed(FetchError),
    /// A batch was fetched and fully processed.
    Batch(BatchReport),
}

/// Running counters, returned when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Non-empty batches fetched.
    pub batches: u64,
    /// Events handed to the processor.
    pub events: u64,
    /// Events that failed after all attempts.
    pub event_failures: u64,
    /// Extra attempts made under [`FailurePolicy::Retry`].
    pub retries: u64,
    /// Fetch calls that returned an error.
    pub fetch_failures: u64,
}

/// Orchestrates one [`Fetcher`] and one [`Processor`].
pub struct Consumer<F, P> {
    fetcher: F,
    processor: P,
    settings: ConsumerSettings,
    stats: ConsumerStats,
}

impl<F, P> std::fmt::Debug for Consumer<F, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("settings", &self.settings)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<F: Fetcher, P: Processor> Consumer<F, P> {
    /// Create a consumer.
    pub fn new(fetcher: F, processor: P, settings: ConsumerSettings) -> Self {
        Self {
            fetcher,
            processor,
            settings,
            stats: ConsumerStats::default(),
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Borrow the source, e.g. to inspect its cursor.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Run exactly one fetch/process cycle without pausing.
    pub async fn step(&mut self) -> Step {
        match self.fetch_phase().await {
            Ok(events) if events.is_empty() => Step::Idle,
            Ok(events) => {
                let report = self.process_phase(&events).await;
                self.fetcher.commit().await;
                Step::Batch(report)
            }
            Err(e) => Step::FetchFailed(e),
        }
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Only the fetch itself is raced against the signal, and [`Fetcher`]
    /// implementations leave their cursor alone when cancelled. A batch that
    /// has been fetched is always processed and committed before the signal
    /// is honoured, since the in-memory cursor already covers it.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ConsumerStats {
        info!(batch_size = self.settings.batch_size, "consumer started");
        let mut backoff = self.settings.fetch_backoff;

        loop {
            if is_shutdown(&shutdown) {
                break;
            }

            let fetched = tokio::select! {
                result = self.fetch_phase() => result,
                () = shutdown_signalled(&mut shutdown) => break,
            };

            match fetched {
                Ok(events) if events.is_empty() => {
                    backoff = self.settings.fetch_backoff;
                    if pause(self.settings.idle_interval, &mut shutdown).await {
                        break;
                    }
                }
                Ok(events) => {
                    backoff = self.settings.fetch_backoff;
                    let report = self.process_phase(&events).await;
                    self.fetcher.commit().await;
                    debug!(
                        events = report.events,
                        failed = report.failed.len(),
                        "batch processed"
                    );
                }
                Err(e) => {
                    warn!(error = %e, backoff_ms = duration_ms(backoff), "fetch failed, backing off");
                    if pause(backoff, &mut shutdown).await {
                        break;
                    }
                    backoff = backoff
                        .saturating_mul(2)
                        .min(self.settings.max_fetch_backoff)
                        .max(self.settings.fetch_backoff);
                }
            }
        }

        info!(
            batches = self.stats.batches,
            events = self.stats.events,
            event_failures = self.stats.event_failures,
            retries = self.stats.retries,
            fetch_failures = self.stats.fetch_failures,
            "consumer stopped"
        );
        self.stats
    }

    async fn fetch_phase(&mut self) -> Result<Vec<Event>, FetchError> {
        match self.fetcher.fetch(self.settings.batch_size).await {
            Ok(events) => {
                if !events.is_empty() {
                    self.stats.batches = self.stats.batches.saturating_add(1);
                }
                Ok(events)
            }
            Err(e) => {
                self.stats.fetch_failures = self.stats.fetch_failures.saturating_add(1);
                Err(e)
            }
        }
    }

    async fn process_phase(&mut self, events: &[Event]) -> BatchReport {
        let mut report = BatchReport {
            events: events.len(),
            failed: Vec::new(),
        };

        for (idx, event) in events.iter().enumerate() {
            self.stats.events = self.stats.events.saturating_add(1);
            if let Err(e) = self.process_event(event).await {
                error!(
                    position = idx,
                    kind = event.kind().as_str(),
                    error = %e,
                    "event processing failed"
                );
                self.stats.event_failures = self.stats.event_failures.saturating_add(1);
                report.failed.push(idx);
            }
        }

        report
    }

    async fn process_event(&mut self, event: &Event) -> Result<(), ProcessError> {
        let max_attempts = self.settings.failure_policy.max_attempts();
        let mut attempt: u32 = 1;

        loop {
            match self.processor.process(event).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < max_attempts && e.is_retryable() => {
                    warn!(attempt, max_attempts, error = %e, "event failed, retrying");
                    self.stats.retries = self.stats.retries.saturating_add(1);
                    attempt = attempt.saturating_add(1);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Whether the shutdown signal has fired or its sender is gone.
fn is_shutdown(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow() || rx.has_changed().is_err()
}

/// Resolve once shutdown is requested or the sender is dropped.
async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep for `duration`; returns `true` if shutdown interrupted the pause.
async fn pause(duration: Duration, rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => false,
        () = shutdown_signalled(rx) => true,
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
