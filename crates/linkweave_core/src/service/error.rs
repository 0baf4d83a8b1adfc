use crate::config::ConfigError;
use crate::daily::DailyNoteError;
use crate::graph::resolver::ResolveError;
use crate::model::note::NoteId;
use crate::store::StoreError;
use crate::template::TemplateError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type EngineResult<T> = Result<T, EngineError>;

/// Failure returned by engine facade operations.
#[derive(Debug)]
pub enum EngineError {
    NotFound(NoteId),
    /// Title is empty after trimming.
    InvalidTitle,
    /// Another note already uses this title.
    TitleTaken(String),
    Store(StoreError),
    Daily(DailyNoteError),
    Resolve(ResolveError),
    Config(ConfigError),
    Template(TemplateError),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "note not found: {id}"),
            Self::InvalidTitle => write!(f, "note title must not be blank"),
            Self::TitleTaken(title) => write!(f, "a note titled `{title}` already exists"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Daily(err) => write!(f, "{err}"),
            Self::Resolve(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Template(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotFound(_) | Self::InvalidTitle | Self::TitleTaken(_) => None,
            Self::Store(err) => Some(err),
            Self::Daily(err) => Some(err),
            Self::Resolve(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::Template(err) => Some(err),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

impl From<DailyNoteError> for EngineError {
    fn from(value: DailyNoteError) -> Self {
        Self::Daily(value)
    }
}

impl From<ResolveError> for EngineError {
    fn from(value: ResolveError) -> Self {
        Self::Resolve(value)
    }
}

impl From<ConfigError> for EngineError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TemplateError> for EngineError {
    fn from(value: TemplateError) -> Self {
        Self::Template(value)
    }
}
