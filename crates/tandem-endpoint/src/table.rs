//! Request-id keyed correlation tables

use std::collections::HashMap;

use parking_lot::Mutex;
use tandem_core::RequestId;

/// A lock-guarded map from request id to an in-flight operation.
///
/// Every operation takes the lock exactly once, so callers on different
/// threads never observe a half-applied insert or remove.
pub struct CorrelationTable<T> {
    entries: Mutex<HashMap<RequestId, T>>,
}

impl<T> CorrelationTable<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Insert unless `id` is already present. Returns whether it was inserted.
    pub fn insert(&self, id: RequestId, value: T) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&id) {
            return false;
        }
        entries.insert(id, value);
        true
    }

    pub fn remove(&self, id: &RequestId) -> Option<T> {
        self.entries.lock().remove(id)
    }

    /// Remove the entry only if `predicate` accepts the stored value
    pub fn remove_if<F>(&self, id: &RequestId, predicate: F) -> Option<T>
    where
        F: FnOnce(&T) -> bool,
    {
        let mut entries = self.entries.lock();
        match entries.get(id) {
            Some(value) if predicate(value) => entries.remove(id),
            _ => None,
        }
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Take every entry out of the table
    pub fn drain(&self) -> Vec<(RequestId, T)> {
        self.entries.lock().drain().collect()
    }
}

impl<T> Default for CorrelationTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
