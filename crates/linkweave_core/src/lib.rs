//! Core link graph engine for linkweave.
//! Parses wiki-links, resolves them to notes and keeps backlinks consistent.

pub mod config;
pub mod daily;
pub mod db;
pub mod graph;
pub mod locks;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;
pub mod template;

pub use config::{ConfigError, EngineConfig};
pub use daily::calendar::{CalendarError, CalendarEvent, CalendarSource};
pub use daily::{date_key, parse_date_key, DailyNoteError};
pub use graph::index::GraphSnapshot;
pub use graph::parser::{normalize_title, parse_links};
pub use graph::resolver::{ResolutionCollision, ResolveError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::link::{Backlink, InboundRef, LinkToken, ResolvedLink, ScannedLink};
pub use model::note::{Note, NoteId, NoteKind, NoteMeta, NoteValidationError};
pub use model::template::{generate_template_id, Template, TemplateInput};
pub use service::{
    ChangeEvent, ChangeKind, DailyAgenda, DrainReport, EngineError, EngineResult, GraphStats,
    LinkState, NoteGraph, PendingNote,
};
pub use store::sqlite_store::SqliteNoteStore;
pub use store::{NoteStore, StoreError, StoreResult, TemplateStore};
pub use template::{default_templates, TemplateError, TemplateLibrary, TemplateVars};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
