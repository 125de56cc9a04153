//! Thread interruption for blocking queue drains
//!
//! Rust threads cannot be interrupted from the outside, so each thread gets
//! a lazily created interrupt state. Another thread holding an
//! [`Interrupter`] can set the status; a thread blocked in
//! [`ReclaimQueue::remove`](crate::ReclaimQueue::remove) observes it, clears
//! it and returns with nothing.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::trace;

/// Something a thread can be blocked on.
///
/// `unblock` must wake every waiter so it can re-check its interrupt
/// status. It is called without any interrupt lock held.
pub(crate) trait Blocker: Send + Sync {
    /// Wake every thread blocked on this.
    fn unblock(&self);
}

/// Per-thread interrupt state.
struct InterruptState {
    thread: ThreadId,
    name: Option<String>,
    /// Interrupt status
    flag: AtomicBool,
    /// What the thread is currently blocked on, if anything
    blocker: Mutex<Option<Arc<dyn Blocker>>>,
}

impl InterruptState {
    fn for_current() -> Self {
        let current = thread::current();
        Self {
            thread: current.id(),
            name: current.name().map(str::to_owned),
            flag: AtomicBool::new(false),
            blocker: Mutex::new(None),
        }
    }
}

thread_local! {
    static CURRENT: Arc<InterruptState> = Arc::new(InterruptState::for_current());
}

fn current_state() -> Arc<InterruptState> {
    CURRENT.with(Arc::clone)
}

/// A handle that can interrupt one particular thread.
///
/// Obtained on the target thread with [`current`] and then moved or cloned
/// to whichever thread wants to interrupt it.
#[derive(Clone)]
pub struct Interrupter {
    state: Arc<InterruptState>,
}

impl Interrupter {
    /// Set the interrupt status and wake the thread if it is blocked.
    pub fn interrupt(&self) {
        self.state.flag.store(true, Ordering::SeqCst);
        let blocker = self.state.blocker.lock().clone();
        trace!(thread = ?self.state.thread, blocked = blocker.is_some(), "interrupt");
        if let Some(blocker) = blocker {
            blocker.unblock();
        }
    }

    /// Whether the interrupt status is set. Does not clear it.
    #[inline]
    pub fn is_interrupted(&self) -> bool {
        self.state.flag.load(Ordering::SeqCst)
    }

    /// Id of the thread this interrupter targets.
    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.state.thread
    }
}

impl fmt::Debug for Interrupter {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Interrupter")
            .field("thread", &self.state.thread)
            .field("name", &self.state.name)
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

/// Interrupter for the calling thread.
pub fn current() -> Interrupter {
    Interrupter {
        state: current_state(),
    }
}

/// Test and clear the calling thread's interrupt status.
pub fn interrupted() -> bool {
    CURRENT.with(|state| state.flag.swap(false, Ordering::SeqCst))
}

/// Registration of the calling thread as blocked on `blocker`.
///
/// Must be created while holding the lock the blocker's `unblock` takes,
/// and the status must be checked under that same lock before waiting.
pub(crate) struct BlockGuard {
    state: Arc<InterruptState>,
}

impl BlockGuard {
    pub(crate) fn register(blocker: Arc<dyn Blocker>) -> Self {
        let state = current_state();
        *state.blocker.lock() = Some(blocker);
        Self { state }
    }

    /// Test and clear the interrupt status of the blocked thread.
    #[inline]
    pub(crate) fn take_interrupt(&self) -> bool {
        self.state.flag.swap(false, Ordering::SeqCst)
    }
}

impl Drop for BlockGuard {
    fn drop(&mut self) {
        self.state.blocker.lock().take();
    }
}
