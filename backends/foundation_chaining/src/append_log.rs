//! Append-only list whose readers iterate a stable snapshot.
//!
//! Appends copy the backing vector only while a snapshot is still alive
//! (`Arc::make_mut`), so readers never observe a partial append and never
//! block writers for longer than a pointer clone.

use std::sync::{Arc, Mutex, MutexGuard};

pub struct AppendOnlyLog<T> {
    entries: Mutex<Arc<Vec<T>>>,
}

impl<T: Clone> AppendOnlyLog<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Arc::new(Vec::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Arc<Vec<T>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn push(&self, entry: T) {
        Arc::make_mut(&mut *self.lock()).push(entry);
    }

    /// Builds and appends an entry while holding the append lock.
    ///
    /// Entries created this way land in the order `make` was called, which
    /// is what keeps outcome records in id order.
    pub fn push_with<F>(&self, make: F) -> T
    where
        F: FnOnce() -> T,
    {
        let mut guard = self.lock();
        let entry = make();
        Arc::make_mut(&mut *guard).push(entry.clone());
        entry
    }

    /// Entries appended so far; later appends do not affect the snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T: Clone> Default for AppendOnlyLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for AppendOnlyLog<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.entries.lock() {
            Ok(entries) => f.debug_list().entries(entries.iter()).finish(),
            Err(_) => f.write_str("AppendOnlyLog(<poisoned>)"),
        }
    }
}
