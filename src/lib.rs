//! A binary buddy memory allocator.
//!
//! [`Pool`] manages one contiguous, power-of-two-sized region of memory
//! (acquired from the OS via `mmap`) and services variable-size
//! allocation/deallocation requests from it in `O(log N)` time, where `N` is
//! the region size.
//!
//! Concurrency is deliberately out of scope: `Pool` performs no locking and
//! is not `Send`/`Sync`. Callers needing shared access must wrap it in their
//! own synchronization.

mod error;
mod header;
mod pool;

pub use error::PoolError;
pub use pool::{Pool, DEFAULT_ORDER, MIN_ORDER};
