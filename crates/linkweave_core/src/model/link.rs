//! Link model: parse-time tokens and resolved graph edges.
//!
//! # Invariants
//! - `LinkToken` is ephemeral; it is recomputed on every parse.
//! - `ResolvedLink` lives only inside the graph index, never in a note body.
//! - Spans are byte offsets into the source body and always fall on
//!   character boundaries.

use crate::model::note::NoteId;
use serde::{Deserialize, Serialize};

/// One wiki-link occurrence extracted from a note body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkToken {
    pub source_note_id: NoteId,
    /// Target text inside `[[...]]`, unescaped and trimmed.
    pub raw_target: String,
    /// Display text; equals `raw_target` when no alias is given.
    pub alias: String,
    /// Byte offset of the opening `[[`.
    pub span_start: usize,
    /// Byte offset just past the closing `]]`.
    pub span_end: usize,
}

/// Edge from a source note to the note its raw target resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLink {
    pub source_note_id: NoteId,
    pub target_note_id: NoteId,
    pub raw_target: String,
    /// Text surrounding the link in the source body.
    pub context: String,
    /// Set when the target note has been deleted.
    pub dangling: bool,
}

/// Inbound edge stored under the target note.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRef {
    pub source_note_id: NoteId,
    pub raw_target: String,
    pub dangling: bool,
}

/// Backlink row rendered by a backlinks panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backlink {
    pub source_note_id: NoteId,
    pub source_title: String,
    pub raw_target: String,
    pub context: String,
    /// The note being viewed was deleted; the reference is kept for display.
    pub dangling: bool,
}

/// Read-only scan result used by the editor to style links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedLink {
    pub token: LinkToken,
    /// `None` when following the link would need to create a note.
    pub target_note_id: Option<NoteId>,
}
