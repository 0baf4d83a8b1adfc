//! Engine configuration.
//!
//! # Responsibility
//! - Hold tunables for batching, debouncing, backlink context and daily notes.
//! - Normalize out-of-range values instead of failing on them.
//!
//! # Invariants
//! - `max_batch` is within `1..=MAX_BATCH_LIMIT` after `validate()`.
//! - `context_radius` is within `0..=MAX_CONTEXT_RADIUS` after `validate()`.
//! - `daily_title_format` is a non-empty chrono format that renders for a
//!   bare date. Time and offset specifiers are rejected.

use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter, Write};
use std::time::Duration;

const DEFAULT_DEBOUNCE_MS: u64 = 300;
const DEFAULT_MAX_BATCH: usize = 64;
const MAX_BATCH_LIMIT: usize = 1024;
const DEFAULT_CONTEXT_RADIUS: usize = 50;
const MAX_CONTEXT_RADIUS: usize = 500;
const DEFAULT_DAILY_TITLE_FORMAT: &str = "%A, %B %-d, %Y";

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// JSON payload could not be decoded.
    Malformed(String),
    /// Daily title format is empty or not a valid chrono format.
    InvalidTitleFormat(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(message) => write!(f, "malformed engine config: {message}"),
            Self::InvalidTitleFormat(format) => {
                write!(f, "invalid daily title format `{format}`")
            }
        }
    }
}

impl Error for ConfigError {}

/// Tunables for the link engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quiet period after the last edit before a note is re-resolved.
    pub debounce_ms: u64,
    /// Dirty notes processed per batch tick.
    pub max_batch: usize,
    /// Characters of backlink context kept on each side of a link.
    pub context_radius: usize,
    /// chrono format used for daily note titles.
    pub daily_title_format: String,
    /// Optional body for new daily notes. Supports `{{date}}`, `{{time}}`,
    /// `{{day_of_week}}` and `{{title}}`.
    pub daily_template: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            max_batch: DEFAULT_MAX_BATCH,
            context_radius: DEFAULT_CONTEXT_RADIUS,
            daily_title_format: DEFAULT_DAILY_TITLE_FORMAT.to_string(),
            daily_template: None,
        }
    }
}

impl EngineConfig {
    /// Decodes and validates a JSON config payload. Missing keys take
    /// their defaults.
    pub fn from_json_str(payload: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(payload).map_err(|err| ConfigError::Malformed(err.to_string()))?;
        config.validate()
    }

    /// Returns a normalized copy, or an error for unusable values.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.max_batch = normalize_max_batch(self.max_batch);
        self.context_radius = self.context_radius.min(MAX_CONTEXT_RADIUS);

        let format = self.daily_title_format.trim();
        if format.is_empty() || !is_valid_date_format(format) {
            return Err(ConfigError::InvalidTitleFormat(
                self.daily_title_format.clone(),
            ));
        }
        self.daily_title_format = format.to_string();
        self.daily_template = self
            .daily_template
            .filter(|template| !template.trim().is_empty());
        Ok(self)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Normalizes the batch size: `0` means default, large values are capped.
fn normalize_max_batch(value: usize) -> usize {
    match value {
        0 => DEFAULT_MAX_BATCH,
        value if value > MAX_BATCH_LIMIT => MAX_BATCH_LIMIT,
        value => value,
    }
}

/// A format is usable only if it renders a plain date. chrono reports
/// `%H`, `%z` and friends as a formatting error at render time.
fn is_valid_date_format(format: &str) -> bool {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return false;
    }
    let Some(sample) = NaiveDate::from_ymd_opt(2000, 1, 1) else {
        return false;
    };
    let mut rendered = String::new();
    write!(rendered, "{}", sample.format_with_items(items.iter())).is_ok()
}
