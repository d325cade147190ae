//! Load-once artifact cache
//!
//! Each key owns its own slot. The first caller for a key loads while
//! holding the slot lock; concurrent callers for the same key wait on that
//! lock and then see the loaded value, so a key is fetched once. Failures
//! leave the slot empty and the next caller retries.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

type Slot<T> = Arc<Mutex<Option<Arc<T>>>>;

/// Per-key single-flight cache of parsed artifacts
pub struct SingleFlightCache<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
}

impl<T> SingleFlightCache<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key`, running `load` only if no
    /// successful load has happened yet.
    pub fn get_or_load<E, F>(&self, key: &str, load: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(key.to_string()).or_default().clone()
        };

        // the map lock is released; only callers of this key wait here
        let mut guard = slot.lock();
        if let Some(value) = guard.as_ref() {
            return Ok(Arc::clone(value));
        }

        let value = Arc::new(load()?);
        *guard = Some(Arc::clone(&value));
        Ok(value)
    }

    /// Cached value without loading
    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        let slot = self.slots.lock().get(key).cloned()?;
        let value = slot.lock().as_ref().map(Arc::clone);
        value
    }

    /// Number of successfully loaded keys
    pub fn len(&self) -> usize {
        let slots: Vec<Slot<T>> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|s| s.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}

impl<T> Default for SingleFlightCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
