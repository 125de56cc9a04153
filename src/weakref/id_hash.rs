//! Weak id map
//!
//! [`IdHash`] maps object ids to weakly held objects. Entries whose objects
//! have been reclaimed are dropped lazily: every lookup and insertion first
//! drains the map's private reclaim queue.

use hashbrown::HashMap;
use tracing::debug;

use super::handle::WeakHandle;
use super::queue::ReclaimQueue;
use crate::runtime::heap::{Gc, ObjectId};

/// Map from object id to a weakly held object.
pub struct IdHash<T> {
    map: HashMap<ObjectId, WeakHandle<T>>,
    queue: ReclaimQueue<T>,
}

impl<T: Send + Sync + 'static> IdHash<T> {
    /// Create an empty map.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            queue: ReclaimQueue::new(),
        }
    }

    /// Register `object`, returning its id.
    pub fn add(
        &mut self,
        object: &Gc<T>,
    ) -> ObjectId {
        self.cleanup();
        let handle = WeakHandle::with_queue(object, &self.queue);
        let id = handle.target_id();
        self.map.insert(id, handle);
        id
    }

    /// The object registered under `id`, if it is still alive.
    pub fn get(
        &mut self,
        id: ObjectId,
    ) -> Option<Gc<T>> {
        self.cleanup();
        self.map.get(&id).and_then(|handle| handle.get().ok())
    }

    /// Drop the entries whose objects have been reported reclaimed.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup(&mut self) -> usize {
        let mut removed = 0;
        while let Some(dead) = self.queue.poll() {
            let id = dead.target_id();
            // The id may have been re-registered with a newer handle.
            if self.map.get(&id) == Some(&dead) {
                self.map.remove(&id);
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, remaining = self.map.len(), "id hash cleanup");
        }
        removed
    }

    /// Live entries, sorted by id.
    pub fn entries(&mut self) -> Vec<(ObjectId, Gc<T>)> {
        self.cleanup();
        let mut entries: Vec<_> = self
            .map
            .iter()
            .filter_map(|(id, handle)| handle.get().ok().map(|object| (*id, object)))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }
}

impl<T> IdHash<T> {
    /// Number of entries, including dead ones not yet cleaned up.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the map has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<T: Send + Sync + 'static> Default for IdHash<T> {
    fn default() -> Self {
        Self::new()
    }
}
