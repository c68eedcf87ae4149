//! Configuration loading and management.
//!
//! Loads `urlminder` configuration from `$URLMINDER_CONFIG` or
//! `~/.urlminder/config.toml`. Environment variables override file values;
//! file values override defaults. Command-line flags are applied last by
//! the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::consumer::{ConsumerSettings, FailurePolicy};
use crate::telegram::client::{DEFAULT_HOST, MAX_UPDATES_LIMIT};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "URLMINDER_CONFIG";

/// Environment variable holding the bot token.
pub const TOKEN_ENV: &str = "URLMINDER_TELEGRAM_TOKEN";

// ── Top-level config ────────────────────────────────────────────

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Telegram API settings (`[telegram]`).
    pub telegram: TelegramConfig,
    /// Consumer loop pacing (`[consumer]`).
    pub consumer: ConsumerConfig,
    /// Cursor checkpoint policy (`[cursor]`).
    pub cursor: CursorConfig,
    /// Storage location (`[storage]`).
    pub storage: StorageConfig,
    /// Logging settings (`[logging]`).
    pub logging: LoggingConfig,
}

/// An environment override that was set but could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedOverride {
    /// Variable name.
    pub var: &'static str,
    /// Raw value found in the environment.
    pub value: String,
}

/// What [`Config::load`] did.
///
/// Config is loaded before the tracing subscriber exists, so nothing is
/// logged while loading. The binary calls [`LoadReport::log`] once logging
/// is initialised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Config file that was consulted.
    pub path: PathBuf,
    /// Whether that file existed.
    pub file_found: bool,
    /// Overrides ignored because their value did not parse.
    pub rejected_overrides: Vec<RejectedOverride>,
}

impl LoadReport {
    /// Emit the load outcome through `tracing`.
    pub fn log(&self) {
        if self.file_found {
            tracing::info!(path = %self.path.display(), "loaded config from file");
        } else {
            tracing::info!(path = %self.path.display(), "no config file found, using defaults");
        }
        for rejected in &self.rejected_overrides {
            tracing::warn!(
                var = rejected.var,
                value = %rejected.value,
                "ignoring invalid env override"
            );
        }
    }
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// `path` replaces the default location when given. A missing config
    /// file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<(Self, LoadReport)> {
        Self::load_with(path, |key: &str| std::env::var(key).ok())
    }

    /// [`Config::load`] with a custom env resolver.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_with(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(Self, LoadReport)> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path_with(&env)?,
        };
        let file = Self::read_file(&path)?;
        let file_found = file.is_some();
        let mut config = file.unwrap_or_default();
        let rejected_overrides = config.apply_overrides(env);
        Ok((
            config,
            LoadReport {
                path,
                file_found,
                rejected_overrides,
            },
        ))
    }

    /// Load from a specific TOML file only, no env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        Ok(Self::read_file(path)?.unwrap_or_default())
    }

    /// `None` when the file does not exist.
    fn read_file(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents)
                .map(Some)
                .with_context(|| format!("failed to parse config at {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            )),
        }
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or has wrong types.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    /// Resolve the config file path using a custom env resolver.
    ///
    /// # Errors
    ///
    /// Returns an error if no explicit path is set and the home directory
    /// cannot be determined.
    pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
        if let Some(p) = env(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(p));
        }
        Ok(config_dir()?.join("config.toml"))
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so tests need not touch the process env.
    /// Values that fail to parse leave the setting alone and are returned.
    pub fn apply_overrides(
        &mut self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Vec<RejectedOverride> {
        let mut rejected = Vec::new();
        if let Some(v) = env(TOKEN_ENV) {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = env("URLMINDER_TELEGRAM_HOST") {
            self.telegram.host = v;
        }
        if let Some(v) = env("URLMINDER_BATCH_SIZE") {
            match v.parse() {
                Ok(n) => self.consumer.batch_size = n,
                Err(_) => rejected.push(RejectedOverride {
                    var: "URLMINDER_BATCH_SIZE",
                    value: v,
                }),
            }
        }
        if let Some(v) = env("URLMINDER_DB_PATH") {
            self.storage.db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env("URLMINDER_LOG_LEVEL") {
            self.logging.level = v;
        }
        rejected
    }

    /// Check values the loop cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        let batch = self.consumer.batch_size;
        if batch == 0 || batch > MAX_UPDATES_LIMIT {
            anyhow::bail!("consumer.batch_size must be between 1 and {MAX_UPDATES_LIMIT}, got {batch}");
        }
        if self.consumer.failure_policy == FailurePolicyConfig::Retry
            && self.consumer.retry_attempts == 0
        {
            anyhow::bail!("consumer.retry_attempts must be at least 1 with failure_policy = \"retry\"");
        }
        if self.telegram.host.trim().is_empty() {
            anyhow::bail!("telegram.host must not be empty");
        }
        Ok(())
    }

    /// Bot token, or an error naming where to set it.
    ///
    /// # Errors
    ///
    /// Returns an error when no non-empty token is configured.
    pub fn require_token(&self) -> Result<&str> {
        match self.telegram.bot_token.as_deref() {
            Some(t) if !t.trim().is_empty() => Ok(t),
            _ => Err(anyhow::anyhow!(
                "missing Telegram bot token: set {TOKEN_ENV}, [telegram].bot_token, or pass --token"
            )),
        }
    }

    /// Resolved database path (configured or `~/.urlminder/data/urlminder.db`).
    ///
    /// # Errors
    ///
    /// Returns an error when the default must be used and the home directory
    /// cannot be determined.
    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(p) => Ok(p.clone()),
            None => Ok(config_dir()?.join("data").join("urlminder.db")),
        }
    }

    /// Resolved logs directory (configured or `~/.urlminder/logs`).
    ///
    /// # Errors
    ///
    /// Returns an error when the default must be used and the home directory
    /// cannot be determined.
    pub fn logs_dir(&self) -> Result<PathBuf> {
        match &self.logging.logs_dir {
            Some(p) => Ok(p.clone()),
            None => Ok(config_dir()?.join("logs")),
        }
    }

    /// Consumer loop settings derived from `[consumer]`.
    pub fn consumer_settings(&self) -> ConsumerSettings {
        let c = &self.consumer;
        ConsumerSettings {
            batch_size: c.batch_size,
            idle_interval: Duration::from_millis(c.idle_interval_ms),
            fetch_backoff: Duration::from_millis(c.fetch_backoff_ms),
            max_fetch_backoff: Duration::from_millis(c.max_fetch_backoff_ms.max(c.fetch_backoff_ms)),
            failure_policy: match c.failure_policy {
                FailurePolicyConfig::LogAndDrop => FailurePolicy::LogAndDrop,
                FailurePolicyConfig::Retry => FailurePolicy::Retry {
                    max_attempts: c.retry_attempts,
                },
            },
        }
    }
}

/// Resolve the default config directory (`~/.urlminder/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".urlminder"))
}

// ── Telegram config ─────────────────────────────────────────────

/// Telegram API settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot API host.
    pub host: String,
    /// Bot token.
    pub bot_token: Option<String>,
    /// HTTP timeout for each `getUpdates` call, in seconds.
    pub request_timeout_seconds: u64,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("host", &self.host)
            .field(
                "bot_token",
                &self.bot_token.as_ref().map(|_| "__REDACTED__"),
            )
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            bot_token: None,
            request_timeout_seconds: 30,
        }
    }
}

// ── Consumer config ─────────────────────────────────────────────

/// Per-event failure policy as written in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicyConfig {
    /// Log and continue with the next event.
    #[default]
    LogAndDrop,
    /// Retry the event up to `retry_attempts` times in total.
    Retry,
}

/// Consumer loop pacing and error tolerance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Maximum updates requested per fetch.
    pub batch_size: usize,
    /// Pause after an empty batch, in milliseconds.
    pub idle_interval_ms: u64,
    /// Pause after a failed fetch, in milliseconds.
    pub fetch_backoff_ms: u64,
    /// Cap for the doubling fetch backoff, in milliseconds.
    pub max_fetch_backoff_ms: u64,
    /// Per-event failure handling.
    pub failure_policy: FailurePolicyConfig,
    /// Total attempts per event when `failure_policy = "retry"`.
    pub retry_attempts: u32,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            idle_interval_ms: 1_000,
            fetch_backoff_ms: 1_000,
            max_fetch_backoff_ms: 1_000,
            failure_policy: FailurePolicyConfig::LogAndDrop,
            retry_attempts: 3,
        }
    }
}

// ── Cursor config ───────────────────────────────────────────────

/// What to do when a saved cursor cannot be read at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorRecovery {
    /// Warn and start from offset zero.
    #[default]
    StartFromZero,
    /// Refuse to start.
    FailFast,
}

/// Cursor checkpoint policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CursorConfig {
    /// Whether the cursor is saved to storage after each successful fetch.
    pub persist: bool,
    /// Behaviour when the checkpoint cannot be loaded.
    pub on_unavailable: CursorRecovery,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            persist: true,
            on_unavailable: CursorRecovery::StartFromZero,
        }
    }
}

// ── Storage / logging config ────────────────────────────────────

/// Storage location.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path; defaults under `~/.urlminder/data/`.
    pub db_path: Option<PathBuf>,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for rotated JSON logs; defaults to `~/.urlminder/logs`.
    pub logs_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            logs_dir: None,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────
