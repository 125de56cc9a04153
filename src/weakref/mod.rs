//! Weak handles and reclaim queues
//!
//! This module contains the user-facing weak reference layer built on the
//! runtime heap.

pub mod handle;
pub mod id_hash;
pub mod queue;
mod record;

pub use handle::WeakHandle;
pub use id_hash::IdHash;
pub use queue::ReclaimQueue;
