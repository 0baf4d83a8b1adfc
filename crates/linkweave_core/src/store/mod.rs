//! Note store adapter contract.
//!
//! # Responsibility
//! - Define the persistence boundary the engine consumes: read, write,
//!   delete and list notes by stable id.
//! - Define the custom template persistence boundary.
//! - Keep storage details out of parsing, resolution and graph code.
//!
//! # Invariants
//! - `write` is an upsert keyed by `id`; `kind` and `date_key` of an
//!   existing record never change.
//! - `list` returns metadata only, sorted by `updated_at DESC, id ASC`.
//! - Implementations must be safe to share across threads.

use crate::db::DbError;
use crate::model::note::{Note, NoteId, NoteMeta, NoteValidationError};
use crate::model::template::Template;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod sqlite_store;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-layer failure.
#[derive(Debug)]
pub enum StoreError {
    /// No record exists for the id.
    NotFound(NoteId),
    /// Record rejected before persistence.
    Validation(NoteValidationError),
    /// Write collided with a uniqueness rule (for example a second daily
    /// note for the same date).
    Conflict(String),
    /// Persisted row cannot be decoded.
    InvalidData(String),
    /// Connection is missing schema objects the store relies on.
    MissingRequiredTable(&'static str),
    /// Backend is temporarily unable to serve the request.
    Unavailable(String),
    Db(DbError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "note not found: {id}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Conflict(message) => write!(f, "note write conflict: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted note data: {message}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::Unavailable(message) => write!(f, "note store unavailable: {message}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NoteValidationError> for StoreError {
    fn from(value: NoteValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Persistence contract consumed by the link engine.
pub trait NoteStore: Send + Sync {
    /// Reads one note, or `StoreError::NotFound`.
    fn read(&self, id: &NoteId) -> StoreResult<Note>;
    /// Inserts or replaces one note.
    fn write(&self, note: &Note) -> StoreResult<()>;
    /// Deletes one note, or `StoreError::NotFound`.
    fn delete(&self, id: &NoteId) -> StoreResult<()>;
    /// Lists metadata for every stored note.
    fn list(&self) -> StoreResult<Vec<NoteMeta>>;
}

/// Persistence contract for user-defined templates. Built-in templates
/// are never stored.
pub trait TemplateStore: Send + Sync {
    fn get_template(&self, id: &str) -> StoreResult<Option<Template>>;
    /// Custom templates ordered by name, then id.
    fn list_templates(&self) -> StoreResult<Vec<Template>>;
    /// Inserts a new template, or `StoreError::Conflict` when the id is taken.
    fn insert_template(&self, template: &Template) -> StoreResult<()>;
    /// Replaces an existing template. Returns `false` when none matched.
    fn replace_template(&self, template: &Template) -> StoreResult<bool>;
    /// Removes a template. Missing ids are not an error.
    fn delete_template(&self, id: &str) -> StoreResult<()>;
}
