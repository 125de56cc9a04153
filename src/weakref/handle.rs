//! Weak handle
//!
//! A [`WeakHandle`] refers to a managed object without keeping it alive.
//! It is bound to its target, and optionally to a [`ReclaimQueue`], once
//! and for all when it is created.
//!
//! # State
//!
//! ```text
//! ALIVE ──(target reclaimed)──► DEAD
//! ```
//!
//! The transition happens exactly once and is observable through
//! [`WeakHandle::is_alive`] and [`WeakHandle::get`]. A bound handle is
//! delivered to its queue at or after the transition, exactly once.

use std::any::{type_name, Any};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr;
use std::sync::{Arc, Weak};

use tracing::debug;

use super::queue::ReclaimQueue;
use super::record::{PendingRecord, WeakRecord};
use crate::error::{WeakError, WeakResult};
use crate::runtime::heap::{Gc, ObjectId, PendingReference, Reclaimable};

struct HandleInner<T> {
    record: WeakRecord<T>,
}

impl<T: Send + Sync + 'static> Reclaimable for HandleInner<T> {
    fn reclaimed(self: Arc<Self>) -> Option<Box<dyn PendingReference>> {
        if !self.record.is_bound() {
            return None;
        }
        Some(Box::new(PendingRecord::new(WeakHandle { inner: self })))
    }
}

/// Weak reference to a managed object.
///
/// Cloning a handle yields the same handle: clones compare equal and are
/// delivered to a queue as one entry.
pub struct WeakHandle<T> {
    inner: Arc<HandleInner<T>>,
}

impl<T: Send + Sync + 'static> WeakHandle<T> {
    /// Create a handle that is not bound to any queue.
    pub fn new(target: &Gc<T>) -> Self {
        Self::build(target, None)
    }

    /// Create a handle that is delivered to `queue` once `target` is
    /// reclaimed.
    pub fn with_queue(
        target: &Gc<T>,
        queue: &ReclaimQueue<T>,
    ) -> Self {
        Self::build(target, Some(queue))
    }

    /// Create a handle from a dynamically typed queue argument.
    ///
    /// This is the entry point for binding layers that receive arbitrary
    /// values. Fails with [`WeakError::InvalidArgument`] if `queue` is not a
    /// `ReclaimQueue<T>`; in that case nothing is registered on the target.
    pub fn try_new(
        target: &Gc<T>,
        queue: Option<&dyn Any>,
    ) -> WeakResult<Self> {
        let queue = match queue {
            None => None,
            Some(arg) => match arg.downcast_ref::<ReclaimQueue<T>>() {
                Some(queue) => Some(queue),
                None => {
                    return Err(WeakError::InvalidArgument(format!(
                        "weak handle can only queue into a ReclaimQueue<{}>",
                        type_name::<T>()
                    )))
                }
            },
        };
        Ok(Self::build(target, queue))
    }

    fn build(
        target: &Gc<T>,
        queue: Option<&ReclaimQueue<T>>,
    ) -> Self {
        let bound = queue.is_some();
        let inner = Arc::new(HandleInner {
            record: WeakRecord::new(target, queue),
        });

        // Unbound handles are never delivered, so the target need not know them.
        if bound {
            let weak: Weak<HandleInner<T>> = Arc::downgrade(&inner);
            let registration: Weak<dyn Reclaimable> = weak;
            target.watch(registration);
        }

        debug!(target_id = %target.id(), bound, "weak handle created");
        Self { inner }
    }

    /// The target, or [`WeakError::StaleReference`] if it has been reclaimed.
    pub fn get(&self) -> WeakResult<Gc<T>> {
        self.inner.record.get().ok_or(WeakError::StaleReference)
    }

    /// Does nothing.
    ///
    /// A handle stays bound to the target it was created with; re-targeting
    /// is not supported.
    #[inline]
    pub fn assign(
        &self,
        _target: &Gc<T>,
    ) {
    }

    /// Whether the target has not been reclaimed yet. Never fails.
    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.inner.record.is_cleared()
    }
}

impl<T> WeakHandle<T> {
    /// Id of the target, still available after it is reclaimed.
    #[inline]
    pub fn target_id(&self) -> ObjectId {
        self.inner.record.referent_id()
    }

    /// Whether the handle was created with a queue.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.inner.record.is_bound()
    }

    /// Whether the handle has been delivered to its queue.
    #[inline]
    pub fn is_enqueued(&self) -> bool {
        self.inner.record.is_enqueued()
    }

    /// Whether two values are the same handle.
    #[inline]
    pub fn ptr_eq(
        this: &Self,
        other: &Self,
    ) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }

    pub(crate) fn record(&self) -> &WeakRecord<T> {
        &self.inner.record
    }
}

impl<T> Clone for WeakHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> PartialEq for WeakHandle<T> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl<T> Eq for WeakHandle<T> {}

impl<T> Hash for WeakHandle<T> {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        ptr::hash(Arc::as_ptr(&self.inner), state)
    }
}

impl<T> fmt::Debug for WeakHandle<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WeakHandle")
            .field("target_id", &self.target_id())
            .field("alive", &!self.inner.record.is_cleared())
            .field("bound", &self.is_bound())
            .finish()
    }
}
