//! Atomically swappable reference snapshot.
//!
//! Readers clone the current `Arc` and match against it without holding the
//! lock; a reload builds a complete new collection and swaps the pointer.

use std::sync::{Arc, RwLock};

use crate::semantic::matcher::ReferenceCollection;

#[derive(Debug, Default)]
pub struct ReferenceStore {
    current: RwLock<Arc<ReferenceCollection>>,
}

impl ReferenceStore {
    pub fn new(collection: ReferenceCollection) -> Self {
        Self {
            current: RwLock::new(Arc::new(collection)),
        }
    }

    /// The collection as of now. Later reloads do not affect it.
    pub fn snapshot(&self) -> Arc<ReferenceCollection> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            // A panic while swapping cannot leave a half-written Arc behind.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Publish `collection`, returning the snapshot it replaced.
    pub fn replace(&self, collection: ReferenceCollection) -> Arc<ReferenceCollection> {
        let next = Arc::new(collection);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }
}
