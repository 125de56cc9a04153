//! Reclaim queue
//!
//! Multi-producer, multi-consumer FIFO of dead weak handles.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

use super::handle::WeakHandle;
use crate::runtime::interrupt::{BlockGuard, Blocker};

struct QueueShared<T> {
    /// Dead handles in arrival order
    entries: Mutex<VecDeque<WeakHandle<T>>>,
    /// Signalled on every enqueue and on interrupt
    available: Condvar,
}

impl<T: Send + Sync + 'static> Blocker for QueueShared<T> {
    fn unblock(&self) {
        let _entries = self.entries.lock();
        self.available.notify_all();
    }
}

/// A sink that receives weak handles once their targets are reclaimed.
///
/// Cloning a queue yields the same queue. Handles are bound to a queue
/// when they are created, see [`WeakHandle::with_queue`].
pub struct ReclaimQueue<T> {
    inner: Arc<QueueShared<T>>,
}

impl<T: Send + Sync + 'static> ReclaimQueue<T> {
    /// Create a new empty queue.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueShared {
                entries: Mutex::new(VecDeque::new()),
                available: Condvar::new(),
            }),
        }
    }

    /// Take the next dead handle if one is pending. Never blocks.
    pub fn poll(&self) -> Option<WeakHandle<T>> {
        self.inner.entries.lock().pop_front()
    }

    /// Take the next dead handle, waiting for one to arrive.
    ///
    /// Returns `None` if the calling thread is interrupted while waiting
    /// (see [`crate::interrupt`]); the interrupt status is cleared.
    pub fn remove(&self) -> Option<WeakHandle<T>> {
        self.wait(None)
    }

    /// Take the next dead handle, waiting at most `timeout`.
    ///
    /// Returns `None` when the timeout elapses or the calling thread is
    /// interrupted. A zero timeout waits indefinitely, like [`remove`].
    ///
    /// [`remove`]: ReclaimQueue::remove
    pub fn remove_timeout(
        &self,
        timeout: Duration,
    ) -> Option<WeakHandle<T>> {
        if timeout.is_zero() {
            return self.wait(None);
        }
        self.wait(Some(timeout))
    }

    /// [`remove_timeout`](ReclaimQueue::remove_timeout) in milliseconds.
    #[inline]
    pub fn remove_timeout_millis(
        &self,
        millis: u64,
    ) -> Option<WeakHandle<T>> {
        self.remove_timeout(Duration::from_millis(millis))
    }

    fn wait(
        &self,
        timeout: Option<Duration>,
    ) -> Option<WeakHandle<T>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut entries = self.inner.entries.lock();

        if let Some(handle) = entries.pop_front() {
            return Some(handle);
        }

        let blocker: Arc<dyn Blocker> = self.inner.clone();
        let guard = BlockGuard::register(blocker);

        loop {
            if let Some(handle) = entries.pop_front() {
                return Some(handle);
            }
            if guard.take_interrupt() {
                warn!("reclaim queue wait interrupted");
                return None;
            }
            match deadline {
                Some(deadline) => {
                    if self
                        .inner
                        .available
                        .wait_until(&mut entries, deadline)
                        .timed_out()
                    {
                        return entries.pop_front();
                    }
                }
                None => self.inner.available.wait(&mut entries),
            }
        }
    }

    /// Number of pending dead handles.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Whether no dead handle is pending.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    pub(crate) fn enqueue(
        &self,
        handle: WeakHandle<T>,
    ) {
        trace!(target_id = %handle.target_id(), "enqueue");
        self.inner.entries.lock().push_back(handle);
        self.inner.available.notify_one();
    }
}

impl<T> ReclaimQueue<T> {
    pub(crate) fn downgrade(&self) -> QueueRef<T> {
        QueueRef {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether two values are the same queue.
    #[inline]
    pub fn ptr_eq(
        this: &Self,
        other: &Self,
    ) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }
}

/// Non-owning reference to a queue, held by the records bound to it.
/// Never keeps the queue or its pending entries alive.
pub(crate) struct QueueRef<T> {
    inner: Weak<QueueShared<T>>,
}

impl<T> QueueRef<T> {
    /// The queue, unless every `ReclaimQueue` for it has been dropped.
    #[inline]
    pub(crate) fn upgrade(&self) -> Option<ReclaimQueue<T>> {
        self.inner.upgrade().map(|inner| ReclaimQueue { inner })
    }
}

impl<T> Clone for ReclaimQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Default for ReclaimQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PartialEq for ReclaimQueue<T> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl<T> Eq for ReclaimQueue<T> {}

impl<T> fmt::Debug for ReclaimQueue<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ReclaimQueue")
            .field("pending", &self.inner.entries.lock().len())
            .finish()
    }
}
