//! Reference resolver.
//!
//! # Responsibility
//! - Map a raw link target onto one note id.
//! - Request creation of missing targets through a `TargetFactory`.
//!
//! # Invariants
//! - Matching is case-insensitive on whitespace-trimmed titles.
//! - Duplicate titles resolve to the most recently updated note; equal
//!   timestamps fall back to the smallest id.
//! - Within one `ResolutionPass` a normalized target always yields the same
//!   id, even if the catalog changes meanwhile.
//! - Date-shaped targets (`YYYY-MM-DD`) resolve to that date's daily note.
//! - The resolver never touches the graph index.

use crate::daily::{date_key, parse_date_key, DailyNoteError};
use crate::graph::catalog::Catalog;
use crate::graph::parser::normalize_title;
use crate::model::note::{NoteId, NoteMeta};
use crate::store::StoreError;
use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Outcome of resolving one raw target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub target_note_id: NoteId,
    /// `true` when resolving this target created the note.
    pub created: bool,
}

/// Non-blocking warning: several notes share one normalized title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionCollision {
    pub normalized_title: String,
    pub winner: NoteId,
    /// All candidates, winner included, sorted by id.
    pub candidates: Vec<NoteId>,
}

#[derive(Debug)]
pub enum ResolveError {
    /// Target is blank after trimming. The parser never emits one, but
    /// `ResolutionPass::resolve` accepts arbitrary input.
    EmptyTarget,
    Store(StoreError),
    Daily(DailyNoteError),
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTarget => write!(f, "link target is empty"),
            Self::Store(err) => write!(f, "cannot create link target: {err}"),
            Self::Daily(err) => write!(f, "cannot create daily link target: {err}"),
        }
    }
}

impl Error for ResolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::EmptyTarget => None,
            Self::Store(err) => Some(err),
            Self::Daily(err) => Some(err),
        }
    }
}

impl From<StoreError> for ResolveError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<DailyNoteError> for ResolveError {
    fn from(value: DailyNoteError) -> Self {
        Self::Daily(value)
    }
}

/// Creates (or finds, under its own serialization) missing link targets.
pub trait TargetFactory {
    /// Returns the note titled `title`, creating it when absent.
    fn ensure_target(&self, title: &str) -> Result<(NoteMeta, bool), StoreError>;
    /// Returns the daily note for `date`, creating it when absent.
    fn ensure_daily(&self, date: NaiveDate) -> Result<(NoteMeta, bool), DailyNoteError>;
}

/// Picks the deterministic winner among same-title candidates.
pub fn pick_winner<'a>(candidates: impl IntoIterator<Item = &'a NoteMeta>) -> Option<&'a NoteMeta> {
    candidates.into_iter().max_by(|left, right| {
        left.updated_at
            .cmp(&right.updated_at)
            .then_with(|| right.id.cmp(&left.id))
    })
}

/// Read-only resolution used for link clicks and hover previews.
///
/// Returns `None` where a resolving pass would have to create a note.
pub fn lookup(raw_target: &str, catalog: &Catalog) -> Option<NoteId> {
    let trimmed = raw_target.trim();
    if let Some(date) = parse_date_key(trimmed) {
        return catalog.daily(&date_key(date)).map(|meta| meta.id.clone());
    }
    pick_winner(catalog.with_title(&normalize_title(trimmed))).map(|meta| meta.id.clone())
}

/// One resolution cycle over a fixed catalog snapshot.
pub struct ResolutionPass {
    catalog: Arc<Catalog>,
    winners: HashMap<String, NoteId>,
    collisions: Vec<ResolutionCollision>,
    created: Vec<NoteId>,
}

impl ResolutionPass {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            winners: HashMap::new(),
            collisions: Vec::new(),
            created: Vec::new(),
        }
    }

    /// Resolves one raw target, creating it through `factory` when absent.
    pub fn resolve(
        &mut self,
        raw_target: &str,
        factory: &dyn TargetFactory,
    ) -> Result<Resolution, ResolveError> {
        let trimmed = raw_target.trim();
        let key = normalize_title(trimmed);
        if key.is_empty() {
            return Err(ResolveError::EmptyTarget);
        }
        if let Some(id) = self.winners.get(&key) {
            return Ok(Resolution {
                target_note_id: id.clone(),
                created: false,
            });
        }

        let resolution = match parse_date_key(trimmed) {
            Some(date) => self.resolve_daily(date, factory)?,
            None => self.resolve_title(trimmed, &key, factory)?,
        };
        if resolution.created {
            self.created.push(resolution.target_note_id.clone());
        }
        self.winners
            .insert(key, resolution.target_note_id.clone());
        Ok(resolution)
    }

    /// Ids of notes created during this pass, in creation order, and the
    /// collisions seen.
    pub fn into_outcome(self) -> (Vec<NoteId>, Vec<ResolutionCollision>) {
        (self.created, self.collisions)
    }

    fn resolve_daily(
        &self,
        date: NaiveDate,
        factory: &dyn TargetFactory,
    ) -> Result<Resolution, ResolveError> {
        if let Some(meta) = self.catalog.daily(&date_key(date)) {
            return Ok(Resolution {
                target_note_id: meta.id.clone(),
                created: false,
            });
        }
        let (meta, created) = factory.ensure_daily(date)?;
        Ok(Resolution {
            target_note_id: meta.id,
            created,
        })
    }

    fn resolve_title(
        &mut self,
        title: &str,
        key: &str,
        factory: &dyn TargetFactory,
    ) -> Result<Resolution, ResolveError> {
        let candidates = self.catalog.with_title(key);
        if let Some(winner) = pick_winner(candidates.iter().copied()) {
            if candidates.len() > 1 {
                let mut ids: Vec<NoteId> = candidates.iter().map(|meta| meta.id.clone()).collect();
                ids.sort();
                warn!(
                    "event=link_resolve_collision module=resolver status=warn winner={} candidates={}",
                    winner.id,
                    ids.len()
                );
                self.collisions.push(ResolutionCollision {
                    normalized_title: key.to_string(),
                    winner: winner.id.clone(),
                    candidates: ids,
                });
            }
            return Ok(Resolution {
                target_note_id: winner.id.clone(),
                created: false,
            });
        }

        let (meta, created) = factory.ensure_target(title)?;
        if created {
            info!(
                "event=link_target_create module=resolver status=ok note_id={}",
                meta.id
            );
        }
        Ok(Resolution {
            target_note_id: meta.id,
            created,
        })
    }
}
