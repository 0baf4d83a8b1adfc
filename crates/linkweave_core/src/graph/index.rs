//! In-memory link graph index.
//!
//! # Responsibility
//! - Hold outbound edges per source note and their transpose (inbound).
//! - Keep a raw-target mention index so renames can find affected notes.
//! - Publish immutable snapshots to readers.
//!
//! # Invariants
//! - `inbound` is exactly the transpose of `outbound` after every call.
//! - A source's outbound set is replaced as a whole; readers either see the
//!   old set or the new one, never a mix.
//! - Edges pointing at a deleted note are kept and flagged `dangling`; the
//!   deleted note's last title is kept in `tombstones` while such edges exist.
//! - Mutators are crate-private: only the change coordinator calls them.

use crate::graph::parser::normalize_title;
use crate::model::link::{InboundRef, ResolvedLink};
use crate::model::note::NoteId;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Edge change produced by one `apply_delta`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDelta {
    pub added: usize,
    pub removed: usize,
    /// Targets whose inbound set gained or lost an entry.
    pub targets: BTreeSet<NoteId>,
}

impl LinkDelta {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// Immutable view of the whole graph at one point in time.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    outbound: HashMap<NoteId, Arc<Vec<ResolvedLink>>>,
    inbound: HashMap<NoteId, Arc<BTreeSet<InboundRef>>>,
    mentions: HashMap<String, BTreeSet<NoteId>>,
    tombstones: HashMap<NoteId, String>,
    version: u64,
}

impl GraphSnapshot {
    /// Monotonic counter bumped by every mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Outbound links of `id` in document order.
    pub fn outbound(&self, id: &NoteId) -> &[ResolvedLink] {
        self.outbound
            .get(id)
            .map(|links| links.as_slice())
            .unwrap_or(&[])
    }

    pub fn inbound(&self, id: &NoteId) -> Vec<&InboundRef> {
        self.inbound
            .get(id)
            .map(|refs| refs.iter().collect())
            .unwrap_or_default()
    }

    /// Last known title of a deleted note that is still referenced.
    pub fn tombstone_title(&self, id: &NoteId) -> Option<&str> {
        self.tombstones.get(id).map(String::as_str)
    }

    /// Sources whose raw targets normalize to `normalized_title`.
    pub fn mentioning(&self, normalized_title: &str) -> BTreeSet<NoteId> {
        self.mentions
            .get(normalized_title)
            .cloned()
            .unwrap_or_default()
    }

    pub fn link_count(&self) -> usize {
        self.outbound.values().map(|links| links.len()).sum()
    }

    pub fn dangling_count(&self) -> usize {
        self.outbound
            .values()
            .flat_map(|links| links.iter())
            .filter(|link| link.dangling)
            .count()
    }

    /// Checks that `inbound` is the exact transpose of `outbound` and that
    /// dangling flags agree with tombstones.
    pub fn verify_symmetry(&self) -> Result<(), String> {
        let mut expected: HashMap<&NoteId, BTreeSet<InboundRef>> = HashMap::new();
        for (source, links) in &self.outbound {
            for link in links.iter() {
                if &link.source_note_id != source {
                    return Err(format!("edge stored under {source} claims source {}", link.source_note_id));
                }
                if link.dangling != self.tombstones.contains_key(&link.target_note_id) {
                    return Err(format!(
                        "edge {source} -> {} has dangling={} but tombstone state disagrees",
                        link.target_note_id, link.dangling
                    ));
                }
                expected
                    .entry(&link.target_note_id)
                    .or_default()
                    .insert(inbound_ref(link));
            }
        }

        if expected.len() != self.inbound.len() {
            return Err(format!(
                "inbound has {} targets, outbound implies {}",
                self.inbound.len(),
                expected.len()
            ));
        }
        for (target, refs) in &self.inbound {
            match expected.get(target) {
                Some(wanted) if wanted == refs.as_ref() => {}
                _ => return Err(format!("inbound entries for {target} do not match outbound")),
            }
        }
        Ok(())
    }
}

/// Single-writer graph index with snapshot reads.
#[derive(Debug, Default)]
pub struct GraphIndex {
    current: RwLock<Arc<GraphSnapshot>>,
}

impl GraphIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current immutable snapshot.
    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        Arc::clone(&self.read())
    }

    pub fn get_outbound(&self, id: &NoteId) -> Vec<ResolvedLink> {
        self.read().outbound(id).to_vec()
    }

    pub fn get_inbound(&self, id: &NoteId) -> Vec<InboundRef> {
        self.read().inbound(id).into_iter().cloned().collect()
    }

    /// Replaces the outbound set of `source` and patches inbound edges by diff.
    ///
    /// Duplicate `(target, raw_target)` pairs keep their first occurrence.
    pub(crate) fn apply_delta(&self, source: &NoteId, links: Vec<ResolvedLink>) -> LinkDelta {
        let mut guard = self.write();
        let graph = Arc::make_mut(&mut guard);

        let mut seen = HashSet::new();
        let links: Vec<ResolvedLink> = links
            .into_iter()
            .filter(|link| seen.insert((link.target_note_id.clone(), link.raw_target.clone())))
            .map(|mut link| {
                link.dangling = graph.tombstones.contains_key(&link.target_note_id);
                link
            })
            .collect();

        let old_links = graph.outbound.remove(source);
        let old_edges = edge_set(old_links.as_deref().map(Vec::as_slice).unwrap_or(&[]));
        let new_edges = edge_set(&links);

        let mut delta = LinkDelta::default();
        for (target, entry) in old_edges.difference(&new_edges) {
            graph.remove_inbound(target, entry);
            delta.removed += 1;
            delta.targets.insert(target.clone());
        }
        for (target, entry) in new_edges.difference(&old_edges) {
            Arc::make_mut(graph.inbound.entry(target.clone()).or_default()).insert(entry.clone());
            delta.added += 1;
            delta.targets.insert(target.clone());
        }

        let old_mentions = mention_keys(old_links.as_deref().map(Vec::as_slice).unwrap_or(&[]));
        let new_mentions = mention_keys(&links);
        for key in old_mentions.difference(&new_mentions) {
            graph.remove_mention(key, source);
        }
        for key in new_mentions.difference(&old_mentions) {
            graph
                .mentions
                .entry(key.clone())
                .or_default()
                .insert(source.clone());
        }

        if !links.is_empty() {
            graph.outbound.insert(source.clone(), Arc::new(links));
        }
        graph.version += 1;
        delta
    }

    /// Drops `id`'s outbound edges and flags edges pointing at it as dangling.
    ///
    /// Returns the sources whose links became dangling.
    pub(crate) fn remove_note(&self, id: &NoteId, title: &str) -> BTreeSet<NoteId> {
        let mut guard = self.write();
        let graph = Arc::make_mut(&mut guard);

        if let Some(old_links) = graph.outbound.remove(id) {
            for (target, entry) in edge_set(&old_links) {
                graph.remove_inbound(&target, &entry);
            }
            for key in mention_keys(&old_links) {
                graph.remove_mention(&key, id);
            }
        }

        let sources = graph.set_dangling(id, true);
        if sources.is_empty() {
            graph.tombstones.remove(id);
        } else {
            graph.tombstones.insert(id.clone(), title.to_string());
        }
        graph.version += 1;
        sources
    }

    /// Clears dangling flags for a note id that exists again.
    ///
    /// Returns the sources whose links resolve again.
    pub(crate) fn revive_note(&self, id: &NoteId) -> BTreeSet<NoteId> {
        if !self.read().tombstones.contains_key(id) {
            return BTreeSet::new();
        }
        let mut guard = self.write();
        let graph = Arc::make_mut(&mut guard);
        graph.tombstones.remove(id);
        let sources = graph.set_dangling(id, false);
        graph.version += 1;
        sources
    }

    /// Lists notes that must be re-resolved after a title change.
    ///
    /// The note id is unchanged by a rename, so no edge is touched here.
    pub(crate) fn rename_note(&self, old_title: &str, new_title: &str) -> BTreeSet<NoteId> {
        let snapshot = self.read();
        let mut affected = snapshot.mentioning(&normalize_title(old_title));
        affected.extend(snapshot.mentioning(&normalize_title(new_title)));
        affected
    }

    fn read(&self) -> RwLockReadGuard<'_, Arc<GraphSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arc<GraphSnapshot>> {
        self.current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl GraphSnapshot {
    fn remove_inbound(&mut self, target: &NoteId, entry: &InboundRef) {
        let now_empty = match self.inbound.get_mut(target) {
            Some(refs) => {
                let refs = Arc::make_mut(refs);
                refs.remove(entry);
                refs.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.inbound.remove(target);
            self.tombstones.remove(target);
        }
    }

    fn remove_mention(&mut self, key: &str, source: &NoteId) {
        if let Some(sources) = self.mentions.get_mut(key) {
            sources.remove(source);
            if sources.is_empty() {
                self.mentions.remove(key);
            }
        }
    }

    fn set_dangling(&mut self, target: &NoteId, dangling: bool) -> BTreeSet<NoteId> {
        let Some(refs) = self.inbound.get(target) else {
            return BTreeSet::new();
        };
        let flipped: BTreeSet<InboundRef> = refs
            .iter()
            .map(|entry| InboundRef {
                dangling,
                ..entry.clone()
            })
            .collect();
        let sources: BTreeSet<NoteId> = flipped
            .iter()
            .map(|entry| entry.source_note_id.clone())
            .collect();
        self.inbound.insert(target.clone(), Arc::new(flipped));

        for source in &sources {
            if let Some(links) = self.outbound.get_mut(source) {
                for link in Arc::make_mut(links).iter_mut() {
                    if &link.target_note_id == target {
                        link.dangling = dangling;
                    }
                }
            }
        }
        sources
    }
}

fn inbound_ref(link: &ResolvedLink) -> InboundRef {
    InboundRef {
        source_note_id: link.source_note_id.clone(),
        raw_target: link.raw_target.clone(),
        dangling: link.dangling,
    }
}

fn edge_set(links: &[ResolvedLink]) -> BTreeSet<(NoteId, InboundRef)> {
    links
        .iter()
        .map(|link| (link.target_note_id.clone(), inbound_ref(link)))
        .collect()
}

fn mention_keys(links: &[ResolvedLink]) -> BTreeSet<String> {
    links
        .iter()
        .map(|link| normalize_title(&link.raw_target))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::GraphIndex;
    use crate::model::link::ResolvedLink;
    use crate::model::note::NoteId;

    fn link(source: &str, target: &str, raw: &str) -> ResolvedLink {
        ResolvedLink {
            source_note_id: NoteId::new(source),
            target_note_id: NoteId::new(target),
            raw_target: raw.to_string(),
            context: format!("[[{raw}]]"),
            dangling: false,
        }
    }

    fn id(value: &str) -> NoteId {
        NoteId::new(value)
    }

    #[test]
    fn apply_delta_diffs_inbound_edges() {
        let graph = GraphIndex::new();
        let first = graph.apply_delta(&id("a"), vec![link("a", "b", "B"), link("a", "c", "C")]);
        assert_eq!((first.added, first.removed), (2, 0));

        let second = graph.apply_delta(&id("a"), vec![link("a", "c", "C"), link("a", "d", "D")]);
        assert_eq!((second.added, second.removed), (1, 1));
        assert_eq!(
            second.targets.into_iter().collect::<Vec<_>>(),
            vec![id("b"), id("d")]
        );

        assert!(graph.get_inbound(&id("b")).is_empty());
        assert_eq!(graph.get_inbound(&id("c")).len(), 1);
        assert_eq!(graph.get_inbound(&id("d"))[0].source_note_id, id("a"));
        graph.snapshot().verify_symmetry().unwrap();
    }

    #[test]
    fn unchanged_edges_produce_empty_delta_but_refresh_context() {
        let graph = GraphIndex::new();
        graph.apply_delta(&id("a"), vec![link("a", "b", "B")]);
        let mut refreshed = link("a", "b", "B");
        refreshed.context = "new context [[B]]".to_string();
        let delta = graph.apply_delta(&id("a"), vec![refreshed]);
        assert!(delta.is_empty());
        assert_eq!(graph.get_outbound(&id("a"))[0].context, "new context [[B]]");
    }

    #[test]
    fn duplicate_links_keep_first_occurrence() {
        let graph = GraphIndex::new();
        graph.apply_delta(
            &id("a"),
            vec![link("a", "b", "B"), link("a", "b", "B"), link("a", "b", "b")],
        );
        assert_eq!(graph.get_outbound(&id("a")).len(), 2);
        assert_eq!(graph.get_inbound(&id("b")).len(), 2);
        graph.snapshot().verify_symmetry().unwrap();
    }

    #[test]
    fn readers_keep_their_snapshot_across_writes() {
        let graph = GraphIndex::new();
        graph.apply_delta(&id("a"), vec![link("a", "b", "B")]);
        let before = graph.snapshot();

        graph.apply_delta(&id("a"), vec![link("a", "c", "C")]);
        assert_eq!(before.outbound(&id("a"))[0].target_note_id, id("b"));
        assert_eq!(graph.snapshot().outbound(&id("a"))[0].target_note_id, id("c"));
        assert!(graph.snapshot().version() > before.version());
    }

    #[test]
    fn remove_note_marks_inbound_dangling_and_drops_outbound() {
        let graph = GraphIndex::new();
        graph.apply_delta(&id("a"), vec![link("a", "b", "B")]);
        graph.apply_delta(&id("b"), vec![link("b", "c", "C")]);

        let sources = graph.remove_note(&id("b"), "B");
        assert_eq!(sources.into_iter().collect::<Vec<_>>(), vec![id("a")]);

        let snapshot = graph.snapshot();
        assert!(snapshot.outbound(&id("a"))[0].dangling);
        assert!(snapshot.inbound(&id("b"))[0].dangling);
        assert!(snapshot.outbound(&id("b")).is_empty());
        assert!(snapshot.inbound(&id("c")).is_empty());
        assert_eq!(snapshot.tombstone_title(&id("b")), Some("B"));
        assert_eq!(snapshot.dangling_count(), 1);
        snapshot.verify_symmetry().unwrap();
    }

    #[test]
    fn tombstone_is_dropped_when_last_reference_goes() {
        let graph = GraphIndex::new();
        graph.apply_delta(&id("a"), vec![link("a", "b", "B")]);
        graph.remove_note(&id("b"), "B");
        graph.apply_delta(&id("a"), Vec::new());

        let snapshot = graph.snapshot();
        assert_eq!(snapshot.tombstone_title(&id("b")), None);
        assert_eq!(snapshot.link_count(), 0);
        snapshot.verify_symmetry().unwrap();
    }

    #[test]
    fn revive_clears_dangling_flags() {
        let graph = GraphIndex::new();
        graph.apply_delta(&id("a"), vec![link("a", "daily-2024-03-01", "2024-03-01")]);
        graph.remove_note(&id("daily-2024-03-01"), "Friday");

        let revived = graph.revive_note(&id("daily-2024-03-01"));
        assert!(revived.contains(&id("a")));
        assert!(!graph.get_outbound(&id("a"))[0].dangling);
        graph.snapshot().verify_symmetry().unwrap();
    }

    #[test]
    fn rename_lists_sources_mentioning_old_or_new_title() {
        let graph = GraphIndex::new();
        graph.apply_delta(&id("a"), vec![link("a", "x", "Project X")]);
        graph.apply_delta(&id("c"), vec![link("c", "y", "project y")]);
        graph.apply_delta(&id("d"), vec![link("d", "z", "Other")]);

        let affected = graph.rename_note("Project X", " PROJECT Y ");
        assert_eq!(affected.into_iter().collect::<Vec<_>>(), vec![id("a"), id("c")]);
    }

    #[test]
    fn self_link_is_removed_with_its_note() {
        let graph = GraphIndex::new();
        graph.apply_delta(&id("a"), vec![link("a", "a", "A")]);
        let sources = graph.remove_note(&id("a"), "A");
        assert!(sources.is_empty());
        let snapshot = graph.snapshot();
        assert_eq!(snapshot.tombstone_title(&id("a")), None);
        snapshot.verify_symmetry().unwrap();
    }
}
