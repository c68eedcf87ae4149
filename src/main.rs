//! urlminder CLI entry point.
//!
//! Provides `start`, `local`, and `status` subcommands for running the
//! Telegram bot, driving the same command handler from stdin, or reporting
//! what is stored.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{info, warn};

use urlminder::cli::{CliProcessor, LineMessenger, StdinSource};
use urlminder::commands::{Commander, Messenger};
use urlminder::config::{Config, LoadReport};
use urlminder::consumer::{Consumer, ConsumerStats};
use urlminder::events::{Fetcher, Processor};
use urlminder::logging;
use urlminder::storage::{CursorStore, MemoryStorage, SqliteStorage, Storage};
use urlminder::telegram::{source, TelegramClient, TelegramMessenger, TelegramProcessor, TelegramSource};

/// urlminder: a Telegram bot that saves links and hands them back at random.
#[derive(Parser)]
#[command(name = "urlminder", version, about)]
struct Cli {
    /// Path to the config file (default: `$URLMINDER_CONFIG` or `~/.urlminder/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Poll Telegram and answer commands until interrupted.
    Start {
        /// Bot token; overrides the config file and environment.
        #[arg(long)]
        token: Option<String>,
    },
    /// Read commands from stdin and print replies to stdout.
    Local {
        /// Keep pages in memory instead of the configured database.
        #[arg(long)]
        in_memory: bool,
    },
    /// Print the saved Telegram cursor and page count, then exit.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // No subscriber exists yet; the report is logged by each handler.
    let (mut config, report) =
        Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Command::Start { token: Some(token) } = &cli.command {
        config.telegram.bot_token = Some(token.clone());
    }
    config.validate().context("invalid configuration")?;

    match cli.command {
        Command::Start { .. } => handle_start(&config, &report).await,
        Command::Local { in_memory } => handle_local(&config, &report, in_memory).await,
        Command::Status => handle_status(&config, &report).await,
    }
}

/// Run the Telegram bot.
async fn handle_start(config: &Config, report: &LoadReport) -> anyhow::Result<()> {
    let token = config.require_token()?.to_owned();

    let logs_dir = config.logs_dir()?;
    let _logging_guard = logging::init_production(&logs_dir, &config.logging.level)?;
    report.log();

    info!(version = env!("CARGO_PKG_VERSION"), "urlminder starting");

    let db_path = config.db_path()?;
    let storage = Arc::new(open_storage(&db_path).await?);
    info!(path = %db_path.display(), "database opened");

    let client = TelegramClient::new(
        &config.telegram.host,
        &token,
        Duration::from_secs(config.telegram.request_timeout_seconds),
    );
    let source = if config.cursor.persist {
        let checkpoint: Arc<dyn CursorStore> = Arc::clone(&storage) as Arc<dyn CursorStore>;
        TelegramSource::restore(client, checkpoint, config.cursor.on_unavailable)
            .await
            .context("failed to restore Telegram cursor")?
    } else {
        TelegramSource::new(client)
    };

    let messenger: Arc<dyn Messenger> = Arc::new(
        TelegramMessenger::new(&config.telegram.host, &token)
            .context("invalid Telegram API host")?,
    );
    let commander = Commander::new(Arc::clone(&storage) as Arc<dyn Storage>, messenger);
    let processor = TelegramProcessor::new(commander);

    let stats = run_until_ctrl_c(source, processor, config).await?;
    info!(
        batches = stats.batches,
        events = stats.events,
        event_failures = stats.event_failures,
        fetch_failures = stats.fetch_failures,
        "urlminder stopped"
    );

    storage.close().await;
    Ok(())
}

/// Drive the command handler from stdin until EOF or Ctrl+C.
async fn handle_local(
    config: &Config,
    report: &LoadReport,
    in_memory: bool,
) -> anyhow::Result<()> {
    logging::init_cli(&config.logging.level);
    report.log();

    let storage: Arc<dyn Storage> = if in_memory {
        Arc::new(MemoryStorage::new())
    } else {
        Arc::new(open_storage(&config.db_path()?).await?)
    };

    let user_name = std::env::var("USER").unwrap_or_else(|_| "local".to_owned());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let source = StdinSource::new(BufReader::new(tokio::io::stdin()), user_name)
        .with_shutdown_on_eof(shutdown_tx.clone());

    let messenger: Arc<dyn Messenger> = Arc::new(LineMessenger::stdout());
    let processor = CliProcessor::new(Commander::new(storage, messenger));

    let consumer = Consumer::new(source, processor, config.consumer_settings());
    let handle = tokio::spawn(consumer.run(shutdown_rx));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to listen for ctrl+c");
            }
            // The consumer may already have stopped at EOF.
            let _ = shutdown_tx.send(true);
        }
        () = shutdown_tx.closed() => {}
    }

    let stats = handle.await.context("consumer task panicked")?;
    info!(events = stats.events, event_failures = stats.event_failures, "local session ended");
    Ok(())
}

/// Print cursor and page count.
async fn handle_status(config: &Config, report: &LoadReport) -> anyhow::Result<()> {
    logging::init_cli(&config.logging.level);
    report.log();

    let db_path = config.db_path()?;
    let storage = open_storage(&db_path).await?;

    let cursor = storage
        .load_cursor(source::ADAPTER)
        .await
        .context("failed to read Telegram cursor")?;
    let pages = storage.count().await.context("failed to count pages")?;
    storage.close().await;

    println!("database: {}", db_path.display());
    match cursor {
        Some(offset) => println!("telegram cursor: {offset}"),
        None => println!("telegram cursor: none"),
    }
    println!("saved pages: {pages}");
    Ok(())
}

async fn open_storage(path: &Path) -> anyhow::Result<SqliteStorage> {
    SqliteStorage::open(path)
        .await
        .with_context(|| format!("failed to open database at {}", path.display()))
}

/// Spawn the consumer and stop it on Ctrl+C.
async fn run_until_ctrl_c<F, P>(
    fetcher: F,
    processor: P,
    config: &Config,
) -> anyhow::Result<ConsumerStats>
where
    F: Fetcher + 'static,
    P: Processor + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = Consumer::new(fetcher, processor, config.consumer_settings());
    let mut handle = tokio::spawn(consumer.run(shutdown_rx));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("received ctrl+c, shutting down"),
                Err(e) => warn!(error = %e, "failed to listen for ctrl+c, shutting down"),
            }
            let _ = shutdown_tx.send(true);
            handle.await.context("consumer task panicked")
        }
        joined = &mut handle => joined.context("consumer task panicked"),
    }
}
