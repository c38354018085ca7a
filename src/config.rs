use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::Config;
use serde::Deserialize;

use crate::error::ImportError;

/// Process-wide settings. Built once at startup, then shared read-only.
///
/// Every field can be overridden from the environment with a `CARDS_` prefix,
/// e.g. `CARDS_DB_PATH=/tmp/cards.sqlite` or `CARDS_ENRICH_CONCURRENCY=8`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub search_base_url: String,
    pub fetch_interval_ms: u64,
    pub enrich_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub enrich_concurrency: usize,
    pub db_path: PathBuf,
    pub checkpoint_path: PathBuf,
    pub openai_base_url: String,
    pub openai_api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            search_base_url: "https://api.scryfall.com".into(),
            // Scryfall asks for 50-100ms between requests.
            fetch_interval_ms: 100,
            enrich_interval_ms: 500,
            request_timeout_secs: 30,
            generation_timeout_secs: 60,
            max_retries: 3,
            base_backoff_ms: 1000,
            enrich_concurrency: 4,
            db_path: PathBuf::from("data/cards.sqlite"),
            checkpoint_path: PathBuf::from("data/import_checkpoint.json"),
            openai_base_url: "https://api.openai.com/v1".into(),
            openai_api_key: None,
            model: "gpt-3.5-turbo".into(),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Config::builder()
            .add_source(config::Environment::with_prefix("CARDS").try_parsing(true))
            .build()
            .context("Failed to read CARDS_* environment")?
            .try_deserialize()
            .context("Invalid CARDS_* settings")
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms)
    }

    pub fn enrich_interval(&self) -> Duration {
        Duration::from_millis(self.enrich_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
        }
    }
}

/// Bounded exponential backoff shared by page fetches and generation calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Parameters of a single import run, as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub resume_from_checkpoint: bool,
    pub enrich_with_ai: bool,
    /// Upper bound on source records handed to batches in this run.
    pub max_records: Option<usize>,
    pub batch_size: usize,
    /// Restrict the import to these set codes (empty = every set).
    pub set_codes: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            resume_from_checkpoint: true,
            enrich_with_ai: true,
            max_records: None,
            batch_size: 50,
            set_codes: Vec::new(),
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<(), ImportError> {
        if self.batch_size == 0 {
            return Err(ImportError::InvalidOptions("batch_size must be at least 1".into()));
        }
        if self.max_records == Some(0) {
            return Err(ImportError::InvalidOptions("max_records must be at least 1".into()));
        }
        if let Some(bad) = self
            .set_codes
            .iter()
            .find(|c| c.is_empty() || !c.chars().all(|ch| ch.is_ascii_alphanumeric()))
        {
            return Err(ImportError::InvalidOptions(format!("bad set code '{}'", bad)));
        }
        Ok(())
    }
}
