//! Note graph engine facade.
//!
//! # Responsibility
//! - Write note changes through the store, then schedule link work.
//! - Drain dirty notes: parse, resolve, commit to the graph index.
//! - Answer backlink, outbound and navigation queries from snapshots.
//!
//! # Invariants
//! - Only one drain runs at a time; it is the single writer of edges.
//! - Store I/O never happens while the state mutex or the graph lock is
//!   held. Lock order is key lock, then state mutex, then graph lock.
//! - Edits to one note (body, title, delete) are serialized by a per-note
//!   lock so a read-modify-write never loses a concurrent edit.
//! - A result computed for a note that was deleted in the meantime is
//!   discarded, never committed.
//! - Subscribers are notified after all locks are released.

use crate::config::EngineConfig;
use crate::daily::calendar::{events_for_day, CalendarEvent, CalendarSource};
use crate::daily::{parse_date_key, DailyNoteError, DailyNoteScheduler};
use crate::graph::catalog::Catalog;
use crate::graph::index::{GraphIndex, GraphSnapshot};
use crate::graph::parser::{link_context, normalize_title, parse_links};
use crate::graph::resolver::{
    lookup, pick_winner, ResolutionCollision, ResolutionPass, ResolveError, TargetFactory,
};
use crate::locks::KeyedLocks;
use crate::model::link::{Backlink, ResolvedLink, ScannedLink};
use crate::model::note::{Note, NoteId, NoteMeta};
use crate::service::coordinator::{CoordinatorState, DrainReport, LinkState, PendingNote};
use crate::service::error::{EngineError, EngineResult};
use crate::service::events::{ChangeEvent, ChangeKind, EventHub};
use crate::store::{NoteStore, StoreError};
use crate::template::{TemplateLibrary, TemplateVars};
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Daily note together with that day's calendar events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAgenda {
    pub note: Note,
    pub events: Vec<CalendarEvent>,
}

/// Corpus-level counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub notes: usize,
    pub links: usize,
    pub dangling_links: usize,
    /// Notes whose links are not yet resolved.
    pub dirty: usize,
}

enum Resolved {
    Links {
        links: Vec<ResolvedLink>,
        created: Vec<NoteId>,
        collisions: Vec<ResolutionCollision>,
    },
    /// The store no longer has the note.
    Missing,
}

/// Link-aware note engine over a `NoteStore`.
pub struct NoteGraph {
    store: Arc<dyn NoteStore>,
    config: EngineConfig,
    graph: GraphIndex,
    state: Mutex<CoordinatorState>,
    drain_lock: Mutex<()>,
    daily: DailyNoteScheduler,
    note_locks: KeyedLocks,
    title_locks: KeyedLocks,
    events: EventHub,
}

impl NoteGraph {
    /// Builds the engine and indexes every stored note once.
    ///
    /// Notes that fail to resolve during bootstrap stay pending and are
    /// retried by later drains.
    pub fn open(store: Arc<dyn NoteStore>, config: EngineConfig) -> EngineResult<Self> {
        let config = config.validate()?;
        let started = Instant::now();
        let metas = store.list()?;

        let mut state = CoordinatorState::new(Catalog::from_notes(metas.iter().cloned()));
        let now = Instant::now();
        for meta in &metas {
            state.mark_dirty(&meta.id, now);
        }

        let engine = Self {
            store,
            daily: DailyNoteScheduler::new(&config),
            config,
            graph: GraphIndex::new(),
            state: Mutex::new(state),
            drain_lock: Mutex::new(()),
            note_locks: KeyedLocks::new(),
            title_locks: KeyedLocks::new(),
            events: EventHub::default(),
        };
        let report = engine.flush();
        let snapshot = engine.graph.snapshot();
        info!(
            "event=graph_bootstrap module=coordinator status={} notes={} links={} created={} failed={} duration_ms={}",
            if report.failed.is_empty() { "ok" } else { "error" },
            metas.len(),
            snapshot.link_count(),
            report.created.len(),
            report.failed.len(),
            started.elapsed().as_millis()
        );
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Receives every change notification emitted after this call.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    /// Creates a normal note and schedules its links.
    pub fn create_note(&self, title: &str, body: &str) -> EngineResult<Note> {
        let title = title.trim();
        if title.is_empty() {
            return Err(EngineError::InvalidTitle);
        }
        let note = Note::new(title, body);
        self.store.write(&note)?;
        let events = self.register(&note);
        self.events.emit_all(events);
        Ok(note)
    }

    /// Creates a normal note whose body is a rendered template.
    ///
    /// Unlike `create_note`, a title that already names a note is refused.
    pub fn create_note_from_template(
        &self,
        templates: &TemplateLibrary,
        template_id: &str,
        title: &str,
    ) -> EngineResult<Note> {
        let title = title.trim();
        if title.is_empty() {
            return Err(EngineError::InvalidTitle);
        }
        let body = templates.apply(template_id, &TemplateVars::now(title))?;

        let key = normalize_title(title);
        let (note, events) = self
            .title_locks
            .with_lock(&key, || -> EngineResult<(Note, Vec<ChangeEvent>)> {
                if !self.state().catalog().with_title(&key).is_empty() {
                    return Err(EngineError::TitleTaken(title.to_string()));
                }
                let note = Note::new(title, body);
                self.store.write(&note)?;
                let events = self.register(&note);
                Ok((note, events))
            })?;
        self.events.emit_all(events);
        info!(
            "event=note_from_template module=coordinator status=ok note_id={} template_id={}",
            note.id, template_id
        );
        Ok(note)
    }

    /// Replaces a note body. The latest body wins once the note drains.
    pub fn update_body(&self, id: &NoteId, body: &str) -> EngineResult<Note> {
        let note = self
            .note_locks
            .with_lock(id.as_str(), || -> EngineResult<Note> {
                let mut note = self.store.read(id)?;
                note.body = body.to_string();
                note.touch();
                self.store.write(&note)?;

                let mut state = self.state();
                state.catalog_mut().upsert(note.meta());
                state.mark_dirty(id, Instant::now());
                Ok(note)
            })?;
        self.events
            .emit(ChangeEvent::new(id.clone(), ChangeKind::Updated));
        Ok(note)
    }

    /// Changes a note title and re-queues every note mentioning the old
    /// or the new title. The note id never changes.
    pub fn rename_note(&self, id: &NoteId, new_title: &str) -> EngineResult<Note> {
        let new_title = new_title.trim();
        if new_title.is_empty() {
            return Err(EngineError::InvalidTitle);
        }
        let (note, affected) = self
            .note_locks
            .with_lock(id.as_str(), || -> EngineResult<(Note, Option<BTreeSet<NoteId>>)> {
                let mut note = self.store.read(id)?;
                if note.title == new_title {
                    return Ok((note, None));
                }
                let old_title = std::mem::replace(&mut note.title, new_title.to_string());
                note.touch();
                self.store.write(&note)?;

                let mut state = self.state();
                state.catalog_mut().upsert(note.meta());
                let affected = self.graph.rename_note(&old_title, new_title);
                let now = Instant::now();
                for source in &affected {
                    state.mark_dirty(source, now);
                }
                Ok((note, Some(affected)))
            })?;
        let Some(affected) = affected else {
            return Ok(note);
        };
        info!(
            "event=note_rename module=coordinator status=ok note_id={} affected={}",
            id,
            affected.len()
        );
        self.events
            .emit(ChangeEvent::new(id.clone(), ChangeKind::Updated));
        Ok(note)
    }

    /// Deletes a note. Links pointing at it become dangling.
    pub fn delete_note(&self, id: &NoteId) -> EngineResult<()> {
        let events = self
            .note_locks
            .with_lock(id.as_str(), || -> EngineResult<Vec<ChangeEvent>> {
                let known = self.state().catalog().contains(id);
                if !known {
                    return Err(EngineError::NotFound(id.clone()));
                }
                match self.store.delete(id) {
                    Ok(()) => {}
                    Err(err) if err.is_not_found() => {}
                    Err(err) => return Err(err.into()),
                }
                Ok(self.forget_note(id))
            })?;
        self.events.emit_all(events);
        Ok(())
    }

    pub fn get_note(&self, id: &NoteId) -> EngineResult<Note> {
        Ok(self.store.read(id)?)
    }

    /// Metadata of every known note, most recently updated first.
    pub fn list_notes(&self) -> Vec<NoteMeta> {
        let catalog = self.state().catalog();
        let mut notes: Vec<NoteMeta> = catalog.iter().cloned().collect();
        notes.sort_by(|left, right| {
            right
                .updated_at
                .cmp(&left.updated_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        notes
    }

    /// Resolves dirty notes whose debounce window has elapsed, up to one
    /// batch.
    pub fn drain_ready(&self) -> DrainReport {
        self.run_batch(Some(self.config.debounce()), &HashSet::new())
    }

    /// Resolves every dirty note now, ignoring the debounce window.
    ///
    /// Each failing note is attempted once per flush and stays pending.
    pub fn flush(&self) -> DrainReport {
        let mut total = DrainReport::default();
        let mut failed = HashSet::new();
        loop {
            let report = self.run_batch(None, &failed);
            if report.is_empty() {
                break;
            }
            failed.extend(report.failed.iter().cloned());
            total.absorb(report);
        }
        total
    }

    /// Immutable view of the whole graph.
    pub fn graph_snapshot(&self) -> Arc<GraphSnapshot> {
        self.graph.snapshot()
    }

    pub fn get_outbound_links(&self, id: &NoteId) -> Vec<ResolvedLink> {
        self.graph.get_outbound(id)
    }

    /// Backlinks of `id`, ordered by source title then document order.
    /// Self-links are excluded.
    pub fn get_backlinks(&self, id: &NoteId) -> Vec<Backlink> {
        let snapshot = self.graph.snapshot();
        let catalog = self.state().catalog();

        let mut rows: Vec<(String, usize, Backlink)> = Vec::new();
        for entry in snapshot.inbound(id) {
            if &entry.source_note_id == id {
                continue;
            }
            let outbound = snapshot.outbound(&entry.source_note_id);
            let Some((position, link)) = outbound.iter().enumerate().find(|(_, link)| {
                &link.target_note_id == id && link.raw_target == entry.raw_target
            }) else {
                continue;
            };
            let source_title = catalog
                .get(&entry.source_note_id)
                .map(|meta| meta.title.clone())
                .unwrap_or_else(|| entry.source_note_id.to_string());
            rows.push((
                normalize_title(&source_title),
                position,
                Backlink {
                    source_note_id: entry.source_note_id.clone(),
                    source_title,
                    raw_target: entry.raw_target.clone(),
                    context: link.context.clone(),
                    dangling: entry.dangling,
                },
            ));
        }

        rows.sort_by(|left, right| {
            left.0
                .cmp(&right.0)
                .then_with(|| left.2.source_note_id.cmp(&right.2.source_note_id))
                .then_with(|| left.1.cmp(&right.1))
        });
        rows.into_iter().map(|(_, _, backlink)| backlink).collect()
    }

    /// Navigation target of a clicked link. Never creates a note.
    pub fn resolve_link_click(&self, raw_target: &str) -> Option<NoteId> {
        lookup(raw_target, &self.state().catalog())
    }

    /// Links in `body` with the note each one currently points at.
    pub fn scan_links(&self, source: &NoteId, body: &str) -> Vec<ScannedLink> {
        let catalog = self.state().catalog();
        parse_links(source, body)
            .into_iter()
            .map(|token| {
                let target_note_id = lookup(&token.raw_target, &catalog);
                ScannedLink {
                    token,
                    target_note_id,
                }
            })
            .collect()
    }

    /// Opens the note a link names, creating it when missing.
    pub fn create_note_from_link(&self, raw_target: &str) -> EngineResult<Note> {
        let trimmed = raw_target.trim();
        if trimmed.is_empty() {
            return Err(EngineError::InvalidTitle);
        }
        if let Some(date) = parse_date_key(trimmed) {
            return self.get_or_create_daily(date);
        }
        let (meta, _) = self.ensure_target(trimmed)?;
        self.get_note(&meta.id)
    }

    /// Returns the daily note for `date`, creating it at most once.
    pub fn get_or_create_daily(&self, date: NaiveDate) -> EngineResult<Note> {
        let (note, _) = self.daily_note(date)?;
        Ok(note)
    }

    /// Daily note plus calendar events. Calendar failures degrade to an
    /// empty event list.
    pub fn daily_agenda(
        &self,
        date: NaiveDate,
        calendar: Option<&dyn CalendarSource>,
    ) -> EngineResult<DailyAgenda> {
        let note = self.get_or_create_daily(date)?;
        let events = events_for_day(calendar, date);
        Ok(DailyAgenda { note, events })
    }

    /// Notes with stale links, including failed ones with their last error.
    pub fn pending_notes(&self) -> Vec<PendingNote> {
        self.state().pending()
    }

    pub fn link_state(&self, id: &NoteId) -> Option<LinkState> {
        self.state().state_of(id)
    }

    pub fn stats(&self) -> GraphStats {
        let snapshot = self.graph.snapshot();
        let state = self.state();
        GraphStats {
            notes: state.catalog().len(),
            links: snapshot.link_count(),
            dangling_links: snapshot.dangling_count(),
            dirty: state.dirty_count(),
        }
    }

    fn state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn daily_note(&self, date: NaiveDate) -> Result<(Note, bool), DailyNoteError> {
        let mut events = Vec::new();
        let outcome = self.daily.get_or_create(
            date,
            self.store.as_ref(),
            |key| self.state().catalog().daily(key).map(|meta| meta.id.clone()),
            |note| events = self.register(note),
        )?;
        // Stored by someone else before this engine saw it.
        if !outcome.created && !self.state().is_live(&outcome.note.id) {
            events = self.register(&outcome.note);
        }
        self.events.emit_all(events);
        Ok((outcome.note, outcome.created))
    }

    /// Adds a freshly written note to the catalog and schedules link work.
    fn register(&self, note: &Note) -> Vec<ChangeEvent> {
        let mut events = vec![ChangeEvent::new(note.id.clone(), ChangeKind::Created)];
        let mut state = self.state();
        let now = Instant::now();
        state.catalog_mut().upsert(note.meta());
        if note.body.trim().is_empty() {
            state.track_clean(&note.id, now);
        } else {
            state.mark_dirty(&note.id, now);
        }

        let revived = self.graph.revive_note(&note.id);
        for source in &revived {
            events.push(ChangeEvent::new(source.clone(), ChangeKind::LinksChanged));
        }
        if !revived.is_empty() {
            events.push(ChangeEvent::new(note.id.clone(), ChangeKind::LinksChanged));
        }
        // A newer note with a taken title wins that title.
        let mentioning = self
            .graph
            .snapshot()
            .mentioning(&normalize_title(&note.title));
        for source in mentioning.iter().filter(|source| *source != &note.id) {
            state.mark_dirty(source, now);
        }
        events
    }

    /// Removes a note from tracking and the graph.
    fn forget_note(&self, id: &NoteId) -> Vec<ChangeEvent> {
        let mut events = vec![ChangeEvent::new(id.clone(), ChangeKind::Deleted)];
        let sources = {
            let mut state = self.state();
            let Some(meta) = state.catalog_mut().remove(id) else {
                return Vec::new();
            };
            state.forget(id);
            self.graph.remove_note(id, &meta.title)
        };
        info!(
            "event=note_delete module=coordinator status=ok note_id={} dangling_sources={}",
            id,
            sources.len()
        );
        events.extend(
            sources
                .into_iter()
                .map(|source| ChangeEvent::new(source, ChangeKind::LinksChanged)),
        );
        events
    }

    fn run_batch(
        &self,
        debounce: Option<Duration>,
        skip: &HashSet<NoteId>,
    ) -> DrainReport {
        let _drain = self
            .drain_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let batch = self
            .state()
            .take_batch(self.config.max_batch, Instant::now(), debounce, skip);

        let mut report = DrainReport::default();
        for id in batch {
            let outcome = self.resolve_note(&id);
            let events = self.commit(&id, outcome, &mut report);
            self.events.emit_all(events);
        }
        report
    }

    /// Slow half of a drain step: store reads and target creation.
    fn resolve_note(&self, id: &NoteId) -> Result<Resolved, ResolveError> {
        let note = match self.store.read(id) {
            Ok(note) => note,
            Err(err) if err.is_not_found() => return Ok(Resolved::Missing),
            Err(err) => return Err(err.into()),
        };

        let mut pass = ResolutionPass::new(self.state().catalog());
        let mut links = Vec::new();
        for token in parse_links(id, &note.body) {
            let resolution = pass.resolve(&token.raw_target, self)?;
            links.push(ResolvedLink {
                source_note_id: id.clone(),
                target_note_id: resolution.target_note_id,
                context: link_context(
                    &note.body,
                    token.span_start,
                    token.span_end,
                    self.config.context_radius,
                ),
                raw_target: token.raw_target,
                dangling: false,
            });
        }
        let (created, collisions) = pass.into_outcome();
        Ok(Resolved::Links {
            links,
            created,
            collisions,
        })
    }

    /// Fast half of a drain step: applies the result under the state lock.
    fn commit(
        &self,
        id: &NoteId,
        outcome: Result<Resolved, ResolveError>,
        report: &mut DrainReport,
    ) -> Vec<ChangeEvent> {
        let mut state = self.state();
        if !state.is_live(id) {
            report.discarded += 1;
            debug!(
                "event=note_resolve module=coordinator status=skip note_id={} reason=deleted",
                id
            );
            return Vec::new();
        }

        match outcome {
            Ok(Resolved::Links {
                links,
                created,
                collisions,
            }) => {
                report.created.extend(created);
                report.collisions.extend(collisions);
                if links
                    .iter()
                    .any(|link| !state.is_live(&link.target_note_id))
                {
                    state.finish(id, Ok(()));
                    state.mark_dirty(id, Instant::now());
                    report.deferred += 1;
                    debug!(
                        "event=note_resolve module=coordinator status=skip note_id={} reason=target_deleted",
                        id
                    );
                    return Vec::new();
                }

                let link_count = links.len();
                let delta = self.graph.apply_delta(id, links);
                state.finish(id, Ok(()));
                report.resolved += 1;
                debug!(
                    "event=note_resolve module=coordinator status=ok note_id={} links={} added={} removed={}",
                    id, link_count, delta.added, delta.removed
                );
                if delta.is_empty() {
                    return Vec::new();
                }
                let mut events = vec![ChangeEvent::new(id.clone(), ChangeKind::LinksChanged)];
                events.extend(
                    delta
                        .targets
                        .into_iter()
                        .filter(|target| target != id)
                        .map(|target| ChangeEvent::new(target, ChangeKind::LinksChanged)),
                );
                events
            }
            Ok(Resolved::Missing) => {
                drop(state);
                debug!(
                    "event=note_resolve module=coordinator status=skip note_id={} reason=missing_in_store",
                    id
                );
                report.discarded += 1;
                self.forget_note(id)
            }
            Err(err) => {
                warn!(
                    "event=note_resolve module=coordinator status=error note_id={} error={}",
                    id, err
                );
                state.finish(id, Err(err.to_string()));
                report.failed.push(id.clone());
                Vec::new()
            }
        }
    }
}

impl TargetFactory for NoteGraph {
    fn ensure_target(&self, title: &str) -> Result<(NoteMeta, bool), StoreError> {
        let key = normalize_title(title);
        let (meta, events) = self
            .title_locks
            .with_lock(&key, || -> Result<(NoteMeta, Vec<ChangeEvent>), StoreError> {
                let existing = {
                    let catalog = self.state().catalog();
                    pick_winner(catalog.with_title(&key)).cloned()
                };
                if let Some(meta) = existing {
                    return Ok((meta, Vec::new()));
                }

                let note = Note::new(title.trim(), "");
                self.store.write(&note)?;
                Ok((note.meta(), self.register(&note)))
            })?;
        let created = !events.is_empty();
        self.events.emit_all(events);
        Ok((meta, created))
    }

    fn ensure_daily(&self, date: NaiveDate) -> Result<(NoteMeta, bool), DailyNoteError> {
        let (note, created) = self.daily_note(date)?;
        Ok((note.meta(), created))
    }
}

#[cfg(test)]
mod tests {
    use super::NoteGraph;
    use crate::config::EngineConfig;
    use crate::store::sqlite_store::SqliteNoteStore;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn created_target_is_announced_after_its_title_lock_is_released() {
        let store = Arc::new(SqliteNoteStore::open_in_memory().unwrap());
        let graph = Arc::new(NoteGraph::open(store, EngineConfig::default()).unwrap());
        let events = graph.subscribe();

        // Holding the subscriber list blocks every emit.
        let subscribers = graph.events.subscribers();
        let worker = {
            let graph = Arc::clone(&graph);
            thread::spawn(move || graph.create_note_from_link("Topic").unwrap())
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while graph.resolve_link_click("Topic").is_none() || graph.title_locks.active_keys() > 0 {
            assert!(Instant::now() < deadline, "title lock held while notifying");
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!worker.is_finished());

        drop(subscribers);
        let note = worker.join().unwrap();
        assert_eq!(events.recv().unwrap().note_id, note.id);
    }
}
