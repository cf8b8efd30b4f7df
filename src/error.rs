use thiserror::Error;

/// Errno-style error indicator surfaced through [`crate::Pool::last_error`].
///
/// Invalid-pointer and double-free conditions are reported on a separate
/// diagnostic channel (`tracing::error!`) rather than through this type: they
/// are misuse to be logged and ignored, not a retrievable error state a
/// caller would branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// No free block of sufficient order was available to satisfy a request.
    #[error("buddy pool exhausted: no free block of sufficient order")]
    OutOfMemory,
    /// The OS failed to map backing memory for the pool.
    #[error("failed to map backing memory from the OS")]
    MapFailed,
    /// The OS failed to release backing memory when the pool was dropped.
    #[error("failed to release backing memory to the OS")]
    UnmapFailed,
}
