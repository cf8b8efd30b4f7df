//! Black-box integration tests driven entirely through the public API —
//! mirrors how an embedding binary would exercise the pool, as opposed to
//! the white-box unit tests in `src/pool.rs` that reach into list internals.

use buddy_pool::{Pool, PoolError};
use proptest::prelude::*;

const ARENA: usize = 1 << 20;

/// Installs the `tracing` fmt subscriber so the invalid-free/double-free
/// diagnostics this crate emits are visible on stderr during `cargo test`,
/// matching how an embedding binary would observe them.
fn init_tracing() {
    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        tracing_subscriber::fmt().with_test_writer().init();
    });
}

/// Two independent pools never intermingle: freeing a pointer from one pool
/// does not disturb allocations still live in the other.
#[test]
fn independent_pools_do_not_intermingle() {
    let mut a = Pool::new(ARENA);
    let mut b = Pool::new(ARENA);

    let pa = a.allocate(128).unwrap();
    let pb = b.allocate(128).unwrap();

    unsafe {
        pa.as_ptr().write_bytes(0xAA, 64);
        pb.as_ptr().write_bytes(0xBB, 64);
    }

    a.free(pa.as_ptr());

    unsafe {
        assert_eq!(*pb.as_ptr(), 0xBB);
    }
    b.free(pb.as_ptr());
}

/// P2 (full coalescence), observed black-box: after every live allocation
/// from a pool has been freed, the pool must again be able to satisfy a
/// single allocation spanning the entire arena — which is only possible if
/// every split has been undone.
#[test]
fn full_coalescence_after_drain() {
    let mut pool = Pool::new(ARENA);
    let sizes = [1usize, 17, 100, 4096, 777, 2];
    let mut live = Vec::new();
    for &s in &sizes {
        live.push(pool.allocate(s).expect("arena large enough for this mix"));
    }
    for p in live.drain(..) {
        pool.free(p.as_ptr());
    }

    let whole = pool.allocate((1usize << pool.max_order()) - 64).expect(
        "pool should have fully coalesced back into a single top-order block after draining",
    );
    pool.free(whole.as_ptr());
}

/// P6: once the arena is exhausted, every further allocate reports
/// out-of-memory and leaves prior state untouched.
#[test]
fn exhaustion_is_sticky_until_a_free() {
    let mut pool = Pool::new(1 << 12); // small arena, easy to exhaust
    let mut live = Vec::new();
    loop {
        match pool.allocate(48) {
            Some(p) => live.push(p),
            None => break,
        }
    }
    assert_eq!(pool.last_error(), Some(PoolError::OutOfMemory));
    assert!(pool.allocate(1).is_none());
    assert!(pool.allocate(48).is_none());

    let freed = live.pop().unwrap();
    pool.free(freed.as_ptr());
    assert!(pool.allocate(48).is_some());

    for p in live {
        pool.free(p.as_ptr());
    }
}

/// Invalid frees and double frees are reported on the diagnostic channel and
/// leave the pool otherwise unaffected — they never panic or corrupt state.
#[test]
fn invalid_and_double_free_are_diagnosed_not_fatal() {
    init_tracing();

    let mut pool = Pool::new(ARENA);

    let mut off_arena = 0u8;
    pool.free(&mut off_arena as *mut u8); // out-of-range, diagnosed, ignored

    let p = pool.allocate(256).unwrap();
    pool.free(p.as_ptr());
    pool.free(p.as_ptr()); // double free, diagnosed, ignored

    // The pool is still fully usable afterwards.
    let q = pool.allocate(256).unwrap();
    pool.free(q.as_ptr());
}

/// A pool that fails to acquire backing memory behaves per its contract:
/// `allocate` always reports out-of-memory, `destroy`/`Drop` is a no-op.
/// (We can't force `mmap` to fail portably, so this only exercises the
/// zero-byte / default-size substitution path, which is the one
/// caller-observable edge `Pool::new` documents.)
#[test]
fn zero_byte_request_substitutes_default_size() {
    let pool = Pool::new(0);
    assert_eq!(pool.total_bytes(), 1usize << buddy_pool::DEFAULT_ORDER);
}

proptest! {
    /// P4: any two simultaneously-live allocations occupy disjoint
    /// `[payload, payload + requested_size)` ranges, for randomized mixes of
    /// allocate/free operations.
    #[test]
    fn randomized_allocations_never_overlap(
        sizes in prop::collection::vec(1usize..=2048, 1..24),
        free_every_third in any::<bool>(),
    ) {
        let mut pool = Pool::new(ARENA);
        let mut live: Vec<(*mut u8, usize)> = Vec::new();

        for (i, size) in sizes.into_iter().enumerate() {
            if let Some(p) = pool.allocate(size) {
                let start = p.as_ptr() as usize;
                let end = start + size;
                for &(other_ptr, other_size) in &live {
                    let other_start = other_ptr as usize;
                    let other_end = other_start + other_size;
                    prop_assert!(end <= other_start || start >= other_end);
                }
                live.push((p.as_ptr(), size));
            }

            if free_every_third && i % 3 == 0 {
                if let Some((ptr, _)) = live.pop() {
                    pool.free(ptr);
                }
            }
        }

        for (ptr, _) in live {
            pool.free(ptr);
        }
    }
}
