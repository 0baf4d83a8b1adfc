//! Note domain model.
//!
//! # Responsibility
//! - Define the note record shared by the store, resolver and daily scheduler.
//! - Provide identity helpers (generated ids, date-derived daily ids).
//!
//! # Invariants
//! - `id` is stable and never reused for another normal note.
//! - `kind == Daily` if and only if `date_key` is set.
//! - `updated_at` only moves forward for a given note.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const DAILY_ID_PREFIX: &str = "daily-";

/// Stable, opaque note identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Wraps an existing identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a fresh identifier for a normal note.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Derives the deterministic identifier of the daily note for `date_key`.
    ///
    /// Two requests for the same date always address the same store record,
    /// which is what makes daily-note creation idempotent across restarts.
    pub fn for_daily(date_key: &str) -> Self {
        Self(format!("{DAILY_ID_PREFIX}{date_key}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NoteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Note category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    /// User-created or link-created note.
    Normal,
    /// Note whose identity is derived from a calendar date.
    Daily,
}

impl NoteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Daily => "daily",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "normal" => Some(Self::Normal),
            "daily" => Some(Self::Daily),
            _ => None,
        }
    }
}

/// Validation failures for note records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteValidationError {
    EmptyId,
    BlankTitle,
    DailyWithoutDateKey,
    DateKeyOnNormalNote,
}

impl Display for NoteValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "note id must not be empty"),
            Self::BlankTitle => write!(f, "note title must not be blank"),
            Self::DailyWithoutDateKey => write!(f, "daily note requires a date_key"),
            Self::DateKeyOnNormalNote => write!(f, "normal note must not carry a date_key"),
        }
    }
}

impl Error for NoteValidationError {}

/// Canonical note record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    /// Display name, matched case-insensitively by wiki-links.
    pub title: String,
    /// Rich document content; only scanned for links.
    pub body: String,
    pub kind: NoteKind,
    /// Zero-padded `YYYY-MM-DD`, present only for daily notes.
    pub date_key: Option<String>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
}

impl Note {
    /// Creates a normal note with a generated id.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        let now = now_epoch_ms();
        Self {
            id: NoteId::generate(),
            title: title.into(),
            body: body.into(),
            kind: NoteKind::Normal,
            date_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates the daily note for `date_key` with its deterministic id.
    pub fn daily(
        date_key: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let date_key = date_key.into();
        let now = now_epoch_ms();
        Self {
            id: NoteId::for_daily(&date_key),
            title: title.into(),
            body: body.into(),
            kind: NoteKind::Daily,
            date_key: Some(date_key),
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks record-level invariants before persistence.
    pub fn validate(&self) -> Result<(), NoteValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(NoteValidationError::EmptyId);
        }
        if self.title.trim().is_empty() {
            return Err(NoteValidationError::BlankTitle);
        }
        match (self.kind, self.date_key.as_deref()) {
            (NoteKind::Daily, None) => Err(NoteValidationError::DailyWithoutDateKey),
            (NoteKind::Normal, Some(_)) => Err(NoteValidationError::DateKeyOnNormalNote),
            _ => Ok(()),
        }
    }

    /// Bumps `updated_at`, keeping it strictly increasing for this note.
    pub fn touch(&mut self) {
        self.updated_at = now_epoch_ms().max(self.updated_at + 1);
    }

    pub fn is_daily(&self) -> bool {
        self.kind == NoteKind::Daily
    }

    /// Returns the metadata projection of this note.
    pub fn meta(&self) -> NoteMeta {
        NoteMeta {
            id: self.id.clone(),
            title: self.title.clone(),
            kind: self.kind,
            date_key: self.date_key.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Body-less note projection used for listing and title matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteMeta {
    pub id: NoteId,
    pub title: String,
    pub kind: NoteKind,
    pub date_key: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::{Note, NoteId, NoteKind, NoteValidationError};

    #[test]
    fn daily_id_is_derived_from_date_key() {
        assert_eq!(NoteId::for_daily("2024-03-01").as_str(), "daily-2024-03-01");
        let note = Note::daily("2024-03-01", "Friday, March 1, 2024", "");
        assert_eq!(note.id, NoteId::for_daily("2024-03-01"));
        assert_eq!(note.kind, NoteKind::Daily);
    }

    #[test]
    fn validate_rejects_kind_and_date_key_mismatch() {
        let mut note = Note::new("Title", "");
        note.date_key = Some("2024-03-01".to_string());
        assert_eq!(
            note.validate(),
            Err(NoteValidationError::DateKeyOnNormalNote)
        );

        let mut daily = Note::daily("2024-03-01", "Title", "");
        daily.date_key = None;
        assert_eq!(
            daily.validate(),
            Err(NoteValidationError::DailyWithoutDateKey)
        );
    }

    #[test]
    fn touch_is_strictly_increasing() {
        let mut note = Note::new("Title", "");
        note.updated_at = i64::MAX / 2;
        let before = note.updated_at;
        note.touch();
        assert!(note.updated_at > before);
    }
}
