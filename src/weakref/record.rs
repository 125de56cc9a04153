//! Low-level weak record
//!
//! The record is the piece a [`WeakHandle`] owns: a weak slot on the target,
//! the target's id, and a weak link to the queue the handle was bound to. The target keeps
//! a weak registration back to the owning handle, which is how a dead
//! record is resolved to its handle when it is delivered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;

use super::handle::WeakHandle;
use super::queue::{QueueRef, ReclaimQueue};
use crate::runtime::heap::{Gc, GcBox, ObjectId, PendingReference};

pub(crate) struct WeakRecord<T> {
    referent: Weak<GcBox<T>>,
    referent_id: ObjectId,
    queue: Option<QueueRef<T>>,
    /// Set once the record has been placed on its queue
    enqueued: AtomicBool,
}

impl<T> WeakRecord<T> {
    pub(crate) fn new(
        target: &Gc<T>,
        queue: Option<&ReclaimQueue<T>>,
    ) -> Self {
        Self {
            referent: target.downgrade(),
            referent_id: target.id(),
            queue: queue.map(ReclaimQueue::downgrade),
            enqueued: AtomicBool::new(false),
        }
    }

    /// The target, if it has not been reclaimed.
    #[inline]
    pub(crate) fn get(&self) -> Option<Gc<T>> {
        Gc::upgrade(&self.referent)
    }

    #[inline]
    pub(crate) fn is_cleared(&self) -> bool {
        self.referent.strong_count() == 0
    }

    #[inline]
    pub(crate) fn referent_id(&self) -> ObjectId {
        self.referent_id
    }

    #[inline]
    pub(crate) fn is_bound(&self) -> bool {
        self.queue.is_some()
    }

    /// The bound queue, if it is still in use.
    #[inline]
    pub(crate) fn queue(&self) -> Option<ReclaimQueue<T>> {
        self.queue.as_ref().and_then(QueueRef::upgrade)
    }

    #[inline]
    pub(crate) fn is_enqueued(&self) -> bool {
        self.enqueued.load(Ordering::SeqCst)
    }
}

/// A dead record on its way to the queue.
pub(crate) struct PendingRecord<T> {
    handle: WeakHandle<T>,
}

impl<T> PendingRecord<T> {
    pub(crate) fn new(handle: WeakHandle<T>) -> Self {
        Self { handle }
    }
}

impl<T: Send + Sync + 'static> PendingReference for PendingRecord<T> {
    fn enqueue(self: Box<Self>) -> bool {
        let PendingRecord { handle } = *self;
        let record = handle.record();
        let queue = match record.queue() {
            Some(queue) => queue,
            None => return false,
        };
        if record.enqueued.swap(true, Ordering::SeqCst) {
            return false;
        }
        queue.enqueue(handle);
        true
    }
}
