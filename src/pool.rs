//! Pool lifecycle and the `allocate`/`free`/`reallocate` operations.

use std::ptr::{self, NonNull};

use crate::error::PoolError;
use crate::header::{buddy_of, order_for, splice_front, unsplice, Header, Tag, HEADER_SIZE};

/// Smallest order the allocator will ever hand out (64 bytes).
pub const MIN_ORDER: u8 = 6;
/// Order substituted for `Pool::new(0)` (1 GiB).
pub const DEFAULT_ORDER: u8 = 30;

/// A single contiguous, power-of-two-sized arena managed by the buddy
/// algorithm: splitting free blocks to satisfy allocations, coalescing
/// mutually-buddy free blocks back together on release.
pub struct Pool {
    base: *mut u8,
    total_bytes: usize,
    max_order: u8,
    /// One sentinel per order, `avail[k]` heading the free list of order `k`.
    ///
    /// Backed by a `Vec` (rather than a fixed-size in-struct array) sized
    /// exactly to `max_order + 1` and never resized after construction, so
    /// element addresses stay stable for the life of the pool even if the
    /// `Pool` value itself is moved.
    avail: Vec<Header>,
    /// Set when OS memory acquisition failed in `new`; gates `allocate` and
    /// `Drop` into well-defined no-ops.
    failed: bool,
    last_error: Option<PoolError>,
}

impl Pool {
    /// Creates a new pool managing `requested_bytes` of backing memory
    /// (rounded up to the next power of two; `0` substitutes
    /// `1 << DEFAULT_ORDER`).
    ///
    /// If the OS fails to map the backing memory, a diagnostic is logged and
    /// a `Pool` is still returned, but in a failed state: `allocate` will
    /// always report out-of-memory and `Drop` is a no-op.
    pub fn new(requested_bytes: usize) -> Pool {
        let bytes = if requested_bytes == 0 {
            1usize << DEFAULT_ORDER
        } else {
            requested_bytes
        };
        let max_order = order_for(bytes).max(MIN_ORDER);
        let total_bytes = 1usize << max_order;

        let mapped = unsafe {
            libc::mmap(
                ptr::null_mut(),
                total_bytes,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if mapped == libc::MAP_FAILED {
            tracing::error!(
                requested_bytes,
                total_bytes,
                "buddy pool: mmap failed acquiring backing memory"
            );
            return Pool {
                base: ptr::null_mut(),
                total_bytes: 0,
                max_order,
                avail: Vec::new(),
                failed: true,
                last_error: Some(PoolError::MapFailed),
            };
        }

        let base = mapped as *mut u8;
        let mut avail = Vec::with_capacity(max_order as usize + 1);
        for _ in 0..=max_order {
            avail.push(unsafe { std::mem::zeroed() });
        }
        unsafe {
            for k in 0..=max_order {
                Header::init_sentinel(avail.as_mut_ptr().add(k as usize), k);
            }

            let block = base as *mut Header;
            let top_sentinel = avail.as_mut_ptr().add(max_order as usize);
            (*block).tag = Tag::Avail;
            (*block).order = max_order;
            (*block).next = top_sentinel;
            (*block).prev = top_sentinel;
            (*top_sentinel).next = block;
            (*top_sentinel).prev = block;
        }

        Pool {
            base,
            total_bytes,
            max_order,
            avail,
            failed: false,
            last_error: None,
        }
    }

    /// Total arena size in bytes (`0` if the pool failed to acquire memory).
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// The pool's maximum order; the whole arena is one block of this order
    /// when idle.
    pub fn max_order(&self) -> u8 {
        self.max_order
    }

    /// The errno-style out-of-memory / OS-failure indicator. Cleared on every
    /// successful `allocate`.
    pub fn last_error(&self) -> Option<PoolError> {
        self.last_error
    }

    /// Allocates a block of at least `size` usable bytes, returning a
    /// pointer to the payload (immediately after the block's header).
    ///
    /// Returns `None` if `size == 0`, if the pool previously failed to
    /// acquire backing memory, or if no free block of sufficient order is
    /// available (in the latter two cases `last_error()` is set to
    /// `PoolError::OutOfMemory` / `PoolError::MapFailed`).
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        if self.failed {
            self.last_error = Some(PoolError::OutOfMemory);
            return None;
        }

        let target = order_for(size.saturating_add(HEADER_SIZE)).max(MIN_ORDER);
        if target > self.max_order {
            self.last_error = Some(PoolError::OutOfMemory);
            return None;
        }

        let mut k = target;
        loop {
            let sentinel = unsafe { self.avail.as_mut_ptr().add(k as usize) };
            if unsafe { (*sentinel).next } != sentinel {
                break;
            }
            if k == self.max_order {
                self.last_error = Some(PoolError::OutOfMemory);
                return None;
            }
            k += 1;
        }

        unsafe {
            let sentinel = self.avail.as_mut_ptr().add(k as usize);
            let block = (*sentinel).next;
            unsplice(block);

            (*block).tag = Tag::Reserved;

            // Split down to `target`. The block was already unsplit from its
            // free list above, so this loop is free to leave its `next`/
            // `prev` untouched — only the freshly produced buddy halves are
            // ever spliced onto a lower-order list.
            let mut cur = k;
            while cur > target {
                cur -= 1;
                (*block).order = cur;
                let buddy = buddy_of(self.base, block, cur);
                (*buddy).order = cur;
                (*buddy).tag = Tag::Avail;
                let buddy_sentinel = self.avail.as_mut_ptr().add(cur as usize);
                splice_front(buddy_sentinel, buddy);
            }

            self.last_error = None;
            let payload = (block as *mut u8).add(HEADER_SIZE);
            Some(NonNull::new_unchecked(payload))
        }
    }

    /// Releases a block previously returned by `allocate`/`reallocate`.
    ///
    /// A null `ptr` is a no-op. A `ptr` that does not point just past a
    /// valid, currently-reserved block header is rejected with a
    /// `tracing::error!` diagnostic and the pool is left unchanged — this is
    /// undefined behavior by contract (mirroring `free`/`realloc` in C), but
    /// the two cheaply-detectable misuses (out-of-range pointer, double
    /// free) are always caught rather than silently corrupting state.
    pub fn free(&mut self, ptr: *mut u8) {
        if self.failed || ptr.is_null() {
            return;
        }

        let block = unsafe { ptr.sub(HEADER_SIZE) as *mut Header };
        let addr = block as usize;
        let arena_start = self.base as usize;
        let arena_end = arena_start + self.total_bytes;
        if addr < arena_start || addr >= arena_end {
            tracing::error!(?ptr, "buddy pool: free() called with an out-of-range pointer");
            return;
        }

        unsafe {
            if (*block).tag != Tag::Reserved {
                tracing::error!(?ptr, "buddy pool: double free or invalid free detected");
                return;
            }

            (*block).tag = Tag::Avail;
            let mut block = block;
            while (*block).order < self.max_order {
                let buddy = buddy_of(self.base, block, (*block).order);
                if (*buddy).tag != Tag::Avail || (*buddy).order != (*block).order {
                    break;
                }
                unsplice(buddy);
                if (buddy as usize) < (block as usize) {
                    block = buddy;
                }
                (*block).order += 1;
            }

            let sentinel = self.avail.as_mut_ptr().add((*block).order as usize);
            splice_front(sentinel, block);
        }
    }

    /// Resizes the block at `ptr` to `size` bytes, preserving
    /// `min(old_capacity, size)` bytes of content.
    ///
    /// `ptr == null` behaves like `allocate(size)`. `size == 0` behaves like
    /// `free(ptr)` and returns `None`. If `size` already fits in the current
    /// block, the same pointer is returned unchanged — this implementation
    /// never shrinks a block in place, trading a larger footprint for
    /// avoiding split/merge churn on every resize.
    pub fn reallocate(&mut self, ptr: *mut u8, size: usize) -> Option<NonNull<u8>> {
        if ptr.is_null() {
            return self.allocate(size);
        }
        if size == 0 {
            self.free(ptr);
            return None;
        }

        let block = unsafe { ptr.sub(HEADER_SIZE) as *mut Header };
        let current_capacity = (1usize << unsafe { (*block).order }) - HEADER_SIZE;
        if size <= current_capacity {
            return Some(unsafe { NonNull::new_unchecked(ptr) });
        }

        let new_ptr = self.allocate(size)?;
        unsafe {
            ptr::copy_nonoverlapping(ptr, new_ptr.as_ptr(), current_capacity.min(size));
        }
        self.free(ptr);
        Some(new_ptr)
    }

    /// Explicit, consuming form of pool teardown. Equivalent to dropping the
    /// pool; provided for parity with the `init`/`destroy` lifecycle naming.
    pub fn destroy(self) {}
}

impl Drop for Pool {
    fn drop(&mut self) {
        if self.failed || self.base.is_null() {
            return;
        }
        let rc = unsafe { libc::munmap(self.base as *mut libc::c_void, self.total_bytes) };
        if rc != 0 {
            tracing::error!("buddy pool: munmap failed while releasing backing memory");
        }
    }
}
