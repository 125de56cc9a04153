//! weakling
//!
//! Weak handles that do not keep their target alive, and reclaim queues
//! that report which handles died.
//!
//! # Example
//!
//! ```rust
//! use weakling::{Heap, ReclaimQueue, WeakHandle};
//!
//! let heap = Heap::new();
//! let queue = ReclaimQueue::new();
//!
//! let target = heap.alloc(String::from("payload"));
//! let handle = WeakHandle::with_queue(&target, &queue);
//! assert!(handle.is_alive());
//!
//! drop(target);
//! heap.collect();
//!
//! assert!(!handle.is_alive());
//! assert_eq!(queue.poll(), Some(handle));
//! ```

#![doc(html_root_url = "https://docs.rs/weakling")]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod runtime;
pub mod weakref;

// Utility modules
pub mod util;

// Re-exports
pub use error::{WeakError, WeakResult};
pub use runtime::heap::{Gc, Heap, HeapConfig, HeapStats, ObjectId, Processing};
pub use runtime::interrupt;
pub use weakref::{IdHash, ReclaimQueue, WeakHandle};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = "weakling";
