use sage_types::EntityKey;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Serialises signed executions per entity.
///
/// A second execute against an entity that already has one in flight is
/// refused immediately rather than queued.
#[derive(Clone, Debug, Default)]
pub struct InFlightGuard {
    busy: Arc<Mutex<HashSet<EntityKey>>>,
}

/// Held for the duration of one execution; releases the entity on drop.
#[derive(Debug)]
pub struct InFlightPermit {
    key: EntityKey,
    busy: Arc<Mutex<HashSet<EntityKey>>>,
}

impl InFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if `key` is already in flight (or the guard is poisoned).
    pub fn try_acquire(&self, key: &EntityKey) -> Option<InFlightPermit> {
        let mut busy = self.busy.lock().ok()?;
        if !busy.insert(key.clone()) {
            return None;
        }
        Some(InFlightPermit {
            key: key.clone(),
            busy: Arc::clone(&self.busy),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.busy.lock().map(|b| b.len()).unwrap_or(0)
    }
}

impl Drop for InFlightPermit {
    fn drop(&mut self) {
        if let Ok(mut busy) = self.busy.lock() {
            busy.remove(&self.key);
        }
    }
}
