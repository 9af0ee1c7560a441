//! In-memory session store.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use super::{SessionSlot, SessionStore, StoreError};

/// Session store backed by a process-local map.
///
/// Used by tests and by embedders that persist nothing across restarts.
/// Clones of an `Arc<MemorySessionStore>` observe the same slots, which is
/// how tests simulate a "fresh process" reading the same storage.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slots: Mutex<HashMap<SessionSlot, String>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether neither slot holds a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, slot: SessionSlot) -> Result<Option<String>, StoreError> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(slots.get(&slot).cloned())
    }

    fn set(&self, slot: SessionSlot, value: &str) -> Result<(), StoreError> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.insert(slot, value.to_string());
        Ok(())
    }

    fn remove(&self, slot: SessionSlot) -> Result<(), StoreError> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.remove(&slot);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}
