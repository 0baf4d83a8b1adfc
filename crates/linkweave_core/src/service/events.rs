//! Change notifications for view layers.
//!
//! # Invariants
//! - Events are delivered in emission order to every live subscriber.
//! - Disconnected subscribers are pruned on the next emit.
//! - Events are never emitted while engine state locks are held.

use crate::model::note::NoteId;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
    LinksChanged,
}

/// Payload delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub note_id: NoteId,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(note_id: NoteId, kind: ChangeKind) -> Self {
        Self { note_id, kind }
    }
}

#[derive(Debug, Default)]
pub(crate) struct EventHub {
    subscribers: Mutex<Vec<Sender<ChangeEvent>>>,
}

impl EventHub {
    pub(crate) fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (sender, receiver) = channel();
        self.subscribers().push(sender);
        receiver
    }

    pub(crate) fn emit(&self, event: ChangeEvent) {
        self.emit_all(std::iter::once(event));
    }

    pub(crate) fn emit_all(&self, events: impl IntoIterator<Item = ChangeEvent>) {
        let mut subscribers = self.subscribers();
        for event in events {
            if subscribers.is_empty() {
                return;
            }
            subscribers.retain(|sender| sender.send(event.clone()).is_ok());
        }
    }

    pub(super) fn subscribers(&self) -> MutexGuard<'_, Vec<Sender<ChangeEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::{ChangeEvent, ChangeKind, EventHub};
    use crate::model::note::NoteId;

    #[test]
    fn subscribers_receive_events_in_order() {
        let hub = EventHub::default();
        let receiver = hub.subscribe();
        hub.emit_all([
            ChangeEvent::new(NoteId::new("a"), ChangeKind::Created),
            ChangeEvent::new(NoteId::new("a"), ChangeKind::LinksChanged),
        ]);

        let kinds: Vec<ChangeKind> = receiver.try_iter().map(|event| event.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::Created, ChangeKind::LinksChanged]);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let hub = EventHub::default();
        let kept = hub.subscribe();
        drop(hub.subscribe());

        hub.emit(ChangeEvent::new(NoteId::new("a"), ChangeKind::Updated));
        assert_eq!(hub.subscribers().len(), 1);
        assert_eq!(kept.try_iter().count(), 1);
    }
}
