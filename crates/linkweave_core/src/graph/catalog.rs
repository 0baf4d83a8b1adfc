//! Corpus catalog: note metadata indexed by normalized title and date key.
//!
//! # Invariants
//! - Every catalog entry appears under exactly one normalized title key.
//! - `by_date` only contains daily notes.

use crate::graph::parser::normalize_title;
use crate::model::note::{NoteId, NoteMeta};
use std::collections::{BTreeSet, HashMap};

/// Snapshot-friendly metadata index used for title matching.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    notes: HashMap<NoteId, NoteMeta>,
    by_title: HashMap<String, BTreeSet<NoteId>>,
    by_date: HashMap<String, NoteId>,
}

impl Catalog {
    pub fn from_notes(notes: impl IntoIterator<Item = NoteMeta>) -> Self {
        let mut catalog = Self::default();
        for meta in notes {
            catalog.upsert(meta);
        }
        catalog
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, id: &NoteId) -> Option<&NoteMeta> {
        self.notes.get(id)
    }

    pub fn contains(&self, id: &NoteId) -> bool {
        self.notes.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NoteMeta> {
        self.notes.values()
    }

    /// Notes whose normalized title equals `normalized_title`.
    pub fn with_title(&self, normalized_title: &str) -> Vec<&NoteMeta> {
        self.by_title
            .get(normalized_title)
            .map(|ids| ids.iter().filter_map(|id| self.notes.get(id)).collect())
            .unwrap_or_default()
    }

    /// The daily note registered for `date_key`.
    pub fn daily(&self, date_key: &str) -> Option<&NoteMeta> {
        self.by_date.get(date_key).and_then(|id| self.notes.get(id))
    }

    /// Inserts or replaces one entry; returns the previous metadata.
    pub fn upsert(&mut self, meta: NoteMeta) -> Option<NoteMeta> {
        let previous = self.remove(&meta.id);
        self.by_title
            .entry(normalize_title(&meta.title))
            .or_default()
            .insert(meta.id.clone());
        if let Some(date_key) = meta.date_key.as_ref() {
            self.by_date.insert(date_key.clone(), meta.id.clone());
        }
        self.notes.insert(meta.id.clone(), meta);
        previous
    }

    pub fn remove(&mut self, id: &NoteId) -> Option<NoteMeta> {
        let meta = self.notes.remove(id)?;
        let title_key = normalize_title(&meta.title);
        if let Some(ids) = self.by_title.get_mut(&title_key) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_title.remove(&title_key);
            }
        }
        if let Some(date_key) = meta.date_key.as_ref() {
            if self.by_date.get(date_key) == Some(id) {
                self.by_date.remove(date_key);
            }
        }
        Some(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::Catalog;
    use crate::model::note::Note;

    #[test]
    fn upsert_moves_entry_between_title_keys() {
        let mut note = Note::new("Project X", "");
        let mut catalog = Catalog::from_notes([note.meta()]);
        assert_eq!(catalog.with_title("project x").len(), 1);

        note.title = "Project Y".to_string();
        let previous = catalog.upsert(note.meta()).unwrap();
        assert_eq!(previous.title, "Project X");
        assert!(catalog.with_title("project x").is_empty());
        assert_eq!(catalog.with_title("project y")[0].id, note.id);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn daily_index_follows_removal() {
        let daily = Note::daily("2024-03-01", "Friday, March 1, 2024", "");
        let mut catalog = Catalog::from_notes([daily.meta()]);
        assert_eq!(catalog.daily("2024-03-01").unwrap().id, daily.id);

        catalog.remove(&daily.id);
        assert!(catalog.daily("2024-03-01").is_none());
        assert!(catalog.is_empty());
    }
}
