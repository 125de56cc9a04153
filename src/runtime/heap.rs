//! Managed heap with reclamation notification
//!
//! Objects allocated on a [`Heap`] are reference counted through [`Gc`]
//! handles. When the last `Gc` goes away the object is reclaimed on the
//! dropping thread: its weak slots are cleared at once, and every still
//! reachable weak handle that asked to be told about it becomes a pending
//! reference. Pending references are delivered to their queues according
//! to the heap's [`Processing`] mode.
//!
//! Reference cycles between managed objects are never reclaimed.

use std::fmt;
use std::mem;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, info, trace, warn};

/// Heap-unique object identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Create an object id from its raw value.
    #[inline]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value.
    #[inline]
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How pending references reach their queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Processing {
    /// Enqueue on the reclaiming thread, before the drop returns.
    Inline,
    /// Park until the next [`Heap::collect`].
    #[default]
    Deferred,
    /// Hand off to a dedicated reference handler thread.
    Background,
}

/// Heap configuration
#[derive(Debug, Clone, Default)]
pub struct HeapConfig {
    /// Reference processing mode
    pub processing: Processing,
}

impl HeapConfig {
    /// Configuration with the given processing mode.
    pub fn with_processing(processing: Processing) -> Self {
        Self { processing }
    }
}

/// Heap statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Objects allocated
    pub allocated: u64,
    /// Objects reclaimed
    pub reclaimed: u64,
    /// References delivered to a queue
    pub enqueued: u64,
    /// References waiting for delivery
    pub pending: usize,
}

/// A reference that must be delivered to its queue.
pub(crate) trait PendingReference: Send {
    /// Deliver. Returns `false` if it had already been delivered.
    fn enqueue(self: Box<Self>) -> bool;
}

/// Something that wants to hear about an object's reclamation.
pub(crate) trait Reclaimable: Send + Sync {
    /// Called once the object is dead. Returns the reference to deliver,
    /// if any.
    fn reclaimed(self: Arc<Self>) -> Option<Box<dyn PendingReference>>;
}

#[derive(Debug, Default)]
struct HeapCounters {
    allocated: AtomicU64,
    reclaimed: AtomicU64,
    enqueued: AtomicU64,
}

fn deliver(
    reference: Box<dyn PendingReference>,
    counters: &HeapCounters,
) -> bool {
    let delivered = reference.enqueue();
    if delivered {
        counters.enqueued.fetch_add(1, Ordering::SeqCst);
    }
    delivered
}

fn drain(
    pending: &Receiver<Box<dyn PendingReference>>,
    counters: &HeapCounters,
) -> usize {
    let mut delivered = 0;
    while let Ok(reference) = pending.try_recv() {
        if deliver(reference, counters) {
            delivered += 1;
        }
    }
    delivered
}

/// State shared by the heap, its objects and the reference handler.
struct HeapShared {
    processing: Processing,
    next_id: AtomicU64,
    /// Set once the owning `Heap` is gone; from then on everything is inline.
    detached: AtomicBool,
    counters: Arc<HeapCounters>,
    pending_tx: Sender<Box<dyn PendingReference>>,
    pending_rx: Receiver<Box<dyn PendingReference>>,
}

impl HeapShared {
    fn submit(
        &self,
        reference: Box<dyn PendingReference>,
    ) {
        if self.processing == Processing::Inline || self.detached.load(Ordering::SeqCst) {
            deliver(reference, &self.counters);
            return;
        }

        if let Err(channel::SendError(reference)) = self.pending_tx.send(reference) {
            deliver(reference, &self.counters);
            return;
        }

        // The heap may have been dropped between the check and the send.
        if self.detached.load(Ordering::SeqCst) {
            drain(&self.pending_rx, &self.counters);
        }
    }
}

/// Allocation backing a [`Gc`].
pub(crate) struct GcBox<T> {
    id: ObjectId,
    heap: Arc<HeapShared>,
    watchers: Mutex<SmallVec<[Weak<dyn Reclaimable>; 2]>>,
    value: T,
}

impl<T> Drop for GcBox<T> {
    fn drop(&mut self) {
        let watchers = mem::take(self.watchers.get_mut());
        self.heap.counters.reclaimed.fetch_add(1, Ordering::SeqCst);
        debug!(id = %self.id, watchers = watchers.len(), "reclaim");

        for watcher in watchers {
            // A handle that was dropped before its target is never enqueued.
            let Some(watcher) = watcher.upgrade() else {
                continue;
            };
            if let Some(reference) = watcher.reclaimed() {
                self.heap.submit(reference);
            }
        }
    }
}

/// Strong reference to a managed object.
///
/// Cloning shares the object. The object is reclaimed when the last `Gc`
/// pointing at it is dropped.
pub struct Gc<T> {
    inner: Arc<GcBox<T>>,
}

impl<T> Gc<T> {
    /// Identity of the object.
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// Whether two handles point at the same object.
    #[inline]
    pub fn ptr_eq(
        this: &Self,
        other: &Self,
    ) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }

    /// Number of strong references to the object.
    #[inline]
    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.inner)
    }

    pub(crate) fn downgrade(&self) -> Weak<GcBox<T>> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<GcBox<T>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Ask to be told when this object is reclaimed.
    pub(crate) fn watch(
        &self,
        watcher: Weak<dyn Reclaimable>,
    ) {
        let mut watchers = self.inner.watchers.lock();
        if watchers.len() == watchers.capacity() {
            watchers.retain(|w| w.strong_count() > 0);
        }
        watchers.push(watcher);
    }

    #[cfg(test)]
    pub(crate) fn watcher_count(&self) -> usize {
        self.inner.watchers.lock().len()
    }
}

impl<T> Clone for Gc<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Deref for Gc<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Gc<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Gc")
            .field("id", &self.inner.id)
            .field("value", &self.inner.value)
            .finish()
    }
}

struct ReferenceHandler {
    shutdown: Sender<()>,
    thread: thread::JoinHandle<()>,
}

impl ReferenceHandler {
    fn spawn(shared: &HeapShared) -> std::io::Result<Self> {
        let (shutdown, shutdown_rx) = channel::bounded::<()>(0);
        let pending = shared.pending_rx.clone();
        let counters = shared.counters.clone();

        let thread = thread::Builder::new()
            .name("weakling-ref-handler".to_string())
            .spawn(move || {
                debug!("reference handler started");
                loop {
                    channel::select! {
                        recv(pending) -> reference => match reference {
                            Ok(reference) => {
                                deliver(reference, &counters);
                            }
                            Err(_) => break,
                        },
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                debug!("reference handler stopped");
            })?;

        Ok(Self { shutdown, thread })
    }

    fn stop(self) {
        drop(self.shutdown);
        if self.thread.join().is_err() {
            warn!("reference handler panicked");
        }
    }
}

/// The memory manager.
///
/// There is no global heap; every heap is independent and objects remember
/// the heap that allocated them.
pub struct Heap {
    shared: Arc<HeapShared>,
    handler: Option<ReferenceHandler>,
}

impl Heap {
    /// Create a heap with deferred reference processing.
    pub fn new() -> Self {
        Self::with_config(HeapConfig::default())
    }

    /// Create a heap with the given configuration.
    pub fn with_config(config: HeapConfig) -> Self {
        let (pending_tx, pending_rx) = channel::unbounded();
        let mut shared = HeapShared {
            processing: config.processing,
            next_id: AtomicU64::new(1),
            detached: AtomicBool::new(false),
            counters: Arc::new(HeapCounters::default()),
            pending_tx,
            pending_rx,
        };

        let handler = match config.processing {
            Processing::Background => match ReferenceHandler::spawn(&shared) {
                Ok(handler) => Some(handler),
                Err(err) => {
                    warn!(error = %err, "cannot spawn reference handler, falling back to deferred processing");
                    shared.processing = Processing::Deferred;
                    None
                }
            },
            _ => None,
        };

        info!(processing = ?shared.processing, "heap created");
        Self {
            shared: Arc::new(shared),
            handler,
        }
    }

    /// Effective reference processing mode.
    #[inline]
    pub fn processing(&self) -> Processing {
        self.shared.processing
    }

    /// Allocate a managed object.
    pub fn alloc<T: Send + Sync + 'static>(
        &self,
        value: T,
    ) -> Gc<T> {
        let id = ObjectId(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
        self.shared
            .counters
            .allocated
            .fetch_add(1, Ordering::SeqCst);
        trace!(id = %id, "alloc");

        Gc {
            inner: Arc::new(GcBox {
                id,
                heap: self.shared.clone(),
                watchers: Mutex::new(SmallVec::new()),
                value,
            }),
        }
    }

    /// Deliver every pending reference to its queue.
    ///
    /// Returns the number of references delivered by this call. Never
    /// waits for objects to die.
    pub fn collect(&self) -> usize {
        let delivered = drain(&self.shared.pending_rx, &self.shared.counters);
        debug!(delivered, "collect");
        delivered
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> HeapStats {
        let counters = &self.shared.counters;
        HeapStats {
            allocated: counters.allocated.load(Ordering::SeqCst),
            reclaimed: counters.reclaimed.load(Ordering::SeqCst),
            enqueued: counters.enqueued.load(Ordering::SeqCst),
            pending: self.shared.pending_rx.len(),
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.stop();
        }
        self.shared.detached.store(true, Ordering::SeqCst);
        let delivered = drain(&self.shared.pending_rx, &self.shared.counters);
        info!(delivered, "heap dropped");
    }
}

impl fmt::Debug for Heap {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Heap")
            .field("processing", &self.shared.processing)
            .field("stats", &self.stats())
            .finish()
    }
}
