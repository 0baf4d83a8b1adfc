//! Daily note scheduling.
//!
//! # Responsibility
//! - Derive the canonical date key and title of a daily note.
//! - Get-or-create the daily note for a date exactly once.
//!
//! # Invariants
//! - `date_key` is zero-padded `YYYY-MM-DD`.
//! - At most one daily note exists per date key; concurrent requests for
//!   one date are serialized by a per-key lock, and the store's unique
//!   date index backs this up durably.
//! - Calendar data never gates daily note creation.

pub mod calendar;

use crate::config::EngineConfig;
use crate::locks::KeyedLocks;
use crate::model::note::{Note, NoteId};
use crate::store::{NoteStore, StoreError};
use crate::template::TemplateVars;
use chrono::NaiveDate;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter, Write};

static DATE_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date key regex"));

/// Canonical key for `date`.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parses a strict, zero-padded `YYYY-MM-DD` key.
pub fn parse_date_key(value: &str) -> Option<NaiveDate> {
    if !DATE_KEY_RE.is_match(value) {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

#[derive(Debug)]
pub enum DailyNoteError {
    Store(StoreError),
}

impl Display for DailyNoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "daily note store failure: {err}"),
        }
    }
}

impl Error for DailyNoteError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
        }
    }
}

impl From<StoreError> for DailyNoteError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Result of a get-or-create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyOutcome {
    pub note: Note,
    pub created: bool,
}

/// Serialized get-or-create of daily notes.
pub struct DailyNoteScheduler {
    locks: KeyedLocks,
    title_format: String,
    template: Option<String>,
}

impl DailyNoteScheduler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            locks: KeyedLocks::new(),
            title_format: config.daily_title_format.clone(),
            template: config.daily_template.clone(),
        }
    }

    /// Human-readable title for `date`. Falls back to the date key when
    /// the format cannot render a date.
    pub fn title_for(&self, date: NaiveDate) -> String {
        let mut title = String::new();
        match write!(title, "{}", date.format(&self.title_format)) {
            Ok(()) if !title.trim().is_empty() => title,
            _ => {
                warn!(
                    "event=daily_title module=daily status=fallback format={:?}",
                    self.title_format
                );
                date_key(date)
            }
        }
    }

    /// Returns the daily note for `date`, creating it when absent.
    ///
    /// `known` maps a date key to an id the caller already tracks;
    /// `on_created` runs inside the critical section after the write.
    pub fn get_or_create(
        &self,
        date: NaiveDate,
        store: &dyn NoteStore,
        known: impl FnOnce(&str) -> Option<NoteId>,
        on_created: impl FnOnce(&Note),
    ) -> Result<DailyOutcome, DailyNoteError> {
        let key = date_key(date);
        self.locks.with_lock(&key, || -> Result<DailyOutcome, DailyNoteError> {
            let candidate = known(&key).unwrap_or_else(|| NoteId::for_daily(&key));
            match store.read(&candidate) {
                Ok(note) => {
                    return Ok(DailyOutcome {
                        note,
                        created: false,
                    })
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err.into()),
            }

            let title = self.title_for(date);
            let body = self
                .template
                .as_deref()
                .map(|template| TemplateVars::on(date, title.as_str()).render(template))
                .unwrap_or_default();
            let note = Note::daily(key.as_str(), title, body);
            store.write(&note)?;
            info!(
                "event=daily_note_create module=daily status=ok note_id={} date_key={}",
                note.id, key
            );
            on_created(&note);
            Ok(DailyOutcome {
                note,
                created: true,
            })
        })
    }
}
