//! Per-key mutual exclusion.
//!
//! # Invariants
//! - Two callers holding the same key never run their critical sections
//!   concurrently; different keys never block each other.
//! - Idle key slots are dropped once no caller holds or awaits them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Lazily created mutex per string key.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `critical` while holding the lock for `key`.
    pub fn with_lock<T>(&self, key: &str, critical: impl FnOnce() -> T) -> T {
        let slot = self.slots().entry(key.to_string()).or_default().clone();

        let result = {
            let _guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            critical()
        };

        let mut slots = self.slots();
        // One reference in the map, one here: nobody else is waiting.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(key);
        }
        result
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        self.slots().len()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
