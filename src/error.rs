//! Weak reference errors

use thiserror::Error;

/// Weak reference result
pub type WeakResult<T> = Result<T, WeakError>;

/// Errors raised by weak handles.
///
/// Interruption of a blocked queue drain is not an error: the drain
/// simply reports that nothing arrived.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeakError {
    /// Construction-time misuse, e.g. binding a handle to something that
    /// is not a reclaim queue.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The target of a weak handle has already been reclaimed.
    #[error("Illegal reference - probably recycled")]
    StaleReference,
}

impl WeakError {
    /// Returns `true` for [`WeakError::StaleReference`].
    #[inline]
    pub fn is_stale(&self) -> bool {
        matches!(self, WeakError::StaleReference)
    }
}
