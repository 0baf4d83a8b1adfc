//! Change coordinator bookkeeping.
//!
//! # Responsibility
//! - Track the link state (`clean`/`dirty`/`resolving`) of every live note.
//! - Keep the worklist of notes waiting for re-resolution.
//! - Own the title catalog the resolver reads.
//!
//! # Invariants
//! - A note id appears at most once in a batch; repeated edits coalesce.
//! - A failed resolution leaves the note `dirty` and queued for retry.
//! - Notes not present in the catalog are never handed out for resolution.

use crate::graph::catalog::Catalog;
use crate::graph::resolver::ResolutionCollision;
use crate::model::note::NoteId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Clean,
    Dirty,
    Resolving,
}

/// Note whose outbound links are stale or failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingNote {
    pub note_id: NoteId,
    pub state: LinkState,
    /// Message of the last failed resolution, if any.
    pub last_error: Option<String>,
}

/// Summary of one or more drained batches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub resolved: usize,
    pub failed: Vec<NoteId>,
    /// Results dropped because their note was deleted mid-flight.
    pub discarded: usize,
    /// Results sent back to the queue because a target vanished mid-flight.
    pub deferred: usize,
    /// Notes auto-created as link targets.
    pub created: Vec<NoteId>,
    pub collisions: Vec<ResolutionCollision>,
}

impl DrainReport {
    /// `true` when no note was taken from the queue.
    pub fn is_empty(&self) -> bool {
        self.resolved == 0 && self.failed.is_empty() && self.discarded == 0 && self.deferred == 0
    }

    pub fn absorb(&mut self, other: DrainReport) {
        self.resolved += other.resolved;
        self.failed.extend(other.failed);
        self.discarded += other.discarded;
        self.deferred += other.deferred;
        self.created.extend(other.created);
        self.collisions.extend(other.collisions);
    }
}

#[derive(Debug, Clone)]
struct Tracking {
    state: LinkState,
    last_edit: Instant,
    last_error: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct CoordinatorState {
    catalog: Arc<Catalog>,
    tracking: HashMap<NoteId, Tracking>,
    queue: VecDeque<NoteId>,
}

impl CoordinatorState {
    pub(crate) fn new(catalog: Catalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            ..Self::default()
        }
    }

    /// Shared catalog snapshot for a resolution pass.
    pub(crate) fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog)
    }

    pub(crate) fn catalog_mut(&mut self) -> &mut Catalog {
        Arc::make_mut(&mut self.catalog)
    }

    pub(crate) fn is_live(&self, id: &NoteId) -> bool {
        self.catalog.contains(id)
    }

    pub(crate) fn track_clean(&mut self, id: &NoteId, now: Instant) {
        self.tracking.entry(id.clone()).or_insert(Tracking {
            state: LinkState::Clean,
            last_edit: now,
            last_error: None,
        });
    }

    /// Marks `id` dirty. Edits to an already dirty note only move the
    /// debounce window.
    pub(crate) fn mark_dirty(&mut self, id: &NoteId, now: Instant) {
        let tracking = self.tracking.entry(id.clone()).or_insert(Tracking {
            state: LinkState::Clean,
            last_edit: now,
            last_error: None,
        });
        tracking.last_edit = now;
        if tracking.state != LinkState::Dirty {
            tracking.state = LinkState::Dirty;
            self.queue.push_back(id.clone());
        }
    }

    /// Takes up to `limit` dirty notes in queue order and marks them
    /// `resolving`. With a debounce window, notes edited too recently stay
    /// queued. Ids in `skip` stay queued as well.
    pub(crate) fn take_batch(
        &mut self,
        limit: usize,
        now: Instant,
        debounce: Option<Duration>,
        skip: &HashSet<NoteId>,
    ) -> Vec<NoteId> {
        let mut batch = Vec::new();
        let mut kept = VecDeque::new();
        let mut seen = HashSet::new();

        while let Some(id) = self.queue.pop_front() {
            if !seen.insert(id.clone()) || !self.catalog.contains(&id) {
                continue;
            }
            let Some(tracking) = self.tracking.get_mut(&id) else {
                continue;
            };
            if tracking.state != LinkState::Dirty {
                continue;
            }
            let settled = debounce
                .map(|window| now.saturating_duration_since(tracking.last_edit) >= window)
                .unwrap_or(true);
            if batch.len() < limit && settled && !skip.contains(&id) {
                tracking.state = LinkState::Resolving;
                batch.push(id);
            } else {
                kept.push_back(id);
            }
        }

        self.queue = kept;
        batch
    }

    /// Records the end of a resolution attempt.
    ///
    /// A note edited while it was resolving is already dirty again and
    /// stays that way.
    pub(crate) fn finish(&mut self, id: &NoteId, outcome: Result<(), String>) {
        let Some(tracking) = self.tracking.get_mut(id) else {
            return;
        };
        match outcome {
            Ok(()) => {
                tracking.last_error = None;
                if tracking.state == LinkState::Resolving {
                    tracking.state = LinkState::Clean;
                }
            }
            Err(message) => {
                tracking.last_error = Some(message);
                if tracking.state == LinkState::Resolving {
                    tracking.state = LinkState::Dirty;
                    self.queue.push_back(id.clone());
                }
            }
        }
    }

    /// Drops all tracking for a deleted note.
    pub(crate) fn forget(&mut self, id: &NoteId) {
        self.tracking.remove(id);
    }

    pub(crate) fn state_of(&self, id: &NoteId) -> Option<LinkState> {
        self.tracking.get(id).map(|tracking| tracking.state)
    }

    /// Notes that are not clean or whose last attempt failed, sorted by id.
    pub(crate) fn pending(&self) -> Vec<PendingNote> {
        let mut pending: Vec<PendingNote> = self
            .tracking
            .iter()
            .filter(|(_, tracking)| {
                tracking.state != LinkState::Clean || tracking.last_error.is_some()
            })
            .map(|(id, tracking)| PendingNote {
                note_id: id.clone(),
                state: tracking.state,
                last_error: tracking.last_error.clone(),
            })
            .collect();
        pending.sort_by(|left, right| left.note_id.cmp(&right.note_id));
        pending
    }

    pub(crate) fn dirty_count(&self) -> usize {
        self.tracking
            .values()
            .filter(|tracking| tracking.state != LinkState::Clean)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::{CoordinatorState, DrainReport, LinkState};
    use crate::graph::catalog::Catalog;
    use crate::model::note::{Note, NoteId};
    use std::collections::HashSet;
    use std::time::{Duration, Instant};

    fn state_with(titles: &[&str]) -> (CoordinatorState, Vec<NoteId>) {
        let notes: Vec<Note> = titles.iter().map(|title| Note::new(*title, "")).collect();
        let ids = notes.iter().map(|note| note.id.clone()).collect();
        let catalog = Catalog::from_notes(notes.iter().map(Note::meta));
        (CoordinatorState::new(catalog), ids)
    }

    #[test]
    fn repeated_edits_coalesce_into_one_batch_entry() {
        let (mut state, ids) = state_with(&["A"]);
        let now = Instant::now();
        for _ in 0..5 {
            state.mark_dirty(&ids[0], now);
        }

        let batch = state.take_batch(10, now, None, &HashSet::new());
        assert_eq!(batch, vec![ids[0].clone()]);
        assert_eq!(state.state_of(&ids[0]), Some(LinkState::Resolving));
        assert!(state.take_batch(10, now, None, &HashSet::new()).is_empty());
    }

    #[test]
    fn debounce_keeps_fresh_edits_queued() {
        let (mut state, ids) = state_with(&["A"]);
        let edited = Instant::now();
        state.mark_dirty(&ids[0], edited);

        let window = Duration::from_millis(300);
        assert!(state.take_batch(10, edited, Some(window), &HashSet::new()).is_empty());
        let later = edited + Duration::from_millis(301);
        assert_eq!(state.take_batch(10, later, Some(window), &HashSet::new()).len(), 1);
    }

    #[test]
    fn batch_limit_preserves_queue_order() {
        let (mut state, ids) = state_with(&["A", "B", "C"]);
        let now = Instant::now();
        for id in &ids {
            state.mark_dirty(id, now);
        }

        assert_eq!(state.take_batch(2, now, None, &HashSet::new()), ids[..2].to_vec());
        assert_eq!(state.take_batch(2, now, None, &HashSet::new()), ids[2..].to_vec());
    }

    #[test]
    fn failure_requeues_and_is_reported_as_pending() {
        let (mut state, ids) = state_with(&["A"]);
        let now = Instant::now();
        state.mark_dirty(&ids[0], now);
        state.take_batch(10, now, None, &HashSet::new());

        state.finish(&ids[0], Err("store unavailable".to_string()));
        assert_eq!(state.state_of(&ids[0]), Some(LinkState::Dirty));
        let pending = state.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("store unavailable"));

        let retry = state.take_batch(10, now, None, &HashSet::new());
        assert_eq!(retry, vec![ids[0].clone()]);
        state.finish(&ids[0], Ok(()));
        assert!(state.pending().is_empty());
        assert_eq!(state.dirty_count(), 0);
    }

    #[test]
    fn edit_during_resolution_stays_dirty() {
        let (mut state, ids) = state_with(&["A"]);
        let now = Instant::now();
        state.mark_dirty(&ids[0], now);
        state.take_batch(10, now, None, &HashSet::new());

        state.mark_dirty(&ids[0], now);
        state.finish(&ids[0], Ok(()));
        assert_eq!(state.state_of(&ids[0]), Some(LinkState::Dirty));
        assert_eq!(state.take_batch(10, now, None, &HashSet::new()).len(), 1);
    }

    #[test]
    fn skipped_and_removed_notes_are_not_taken() {
        let (mut state, ids) = state_with(&["A", "B"]);
        let now = Instant::now();
        state.mark_dirty(&ids[0], now);
        state.mark_dirty(&ids[1], now);

        state.catalog_mut().remove(&ids[1]);
        state.forget(&ids[1]);
        let skip = HashSet::from([ids[0].clone()]);
        assert!(state.take_batch(10, now, None, &skip).is_empty());
        assert_eq!(state.take_batch(10, now, None, &HashSet::new()), vec![ids[0].clone()]);
    }

    #[test]
    fn reports_absorb_counts() {
        let mut total = DrainReport::default();
        assert!(total.is_empty());
        total.absorb(DrainReport {
            resolved: 2,
            failed: vec![NoteId::new("x")],
            ..DrainReport::default()
        });
        assert_eq!(total.resolved, 2);
        assert_eq!(total.failed.len(), 1);
        assert!(!total.is_empty());
    }
}
