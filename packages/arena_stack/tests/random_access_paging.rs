//! Touches pages of a fresh arena in random order, which must work without the arena ever
//! having been grown sequentially.

use std::collections::HashMap;
use std::ptr::NonNull;

use arena_stack::{Arena, ArenaPool, GrowthPolicy};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

#[cfg(not(miri))]
const ARENA_SIZE: usize = 256 * 1024 * 1024;

// Under Miri, we use a smaller arena because Miri test runtime scales by memory usage.
#[cfg(miri)]
const ARENA_SIZE: usize = 4 * 1024 * 1024;

const WRITE_COUNT: usize = 10_000;

fn write_and_verify_random_offsets(base: NonNull<u8>, size: usize) {
    let mut rng = SmallRng::seed_from_u64(0x5eed);

    // Later writes to the same offset replace earlier ones.
    let mut expected = HashMap::new();

    for i in 0..WRITE_COUNT {
        let offset = rng.random_range(0..size / 8) * 8;
        let value = u64::try_from(i).unwrap();

        // SAFETY: The offset is within the arena and aligned for u64. Nothing else uses the
        // arena while we hold it.
        unsafe {
            base.add(offset).cast::<u64>().write(value);
        }

        expected.insert(offset, value);
    }

    for (offset, value) in expected {
        // SAFETY: As above.
        let actual = unsafe { base.add(offset).cast::<u64>().read() };

        assert_eq!(actual, value, "unexpected value at offset {offset}");
    }
}

#[test]
fn standalone_arena_accepts_random_writes() {
    let arena = Arena::new(ARENA_SIZE).unwrap();

    write_and_verify_random_offsets(arena.base(), arena.size());
}

#[test]
fn pooled_arena_accepts_random_writes() {
    let pool = ArenaPool::builder()
        .arena_size(ARENA_SIZE)
        .growth_policy(GrowthPolicy::RandomAccess)
        .build();

    let lease = pool.acquire();

    write_and_verify_random_offsets(lease.arena().base(), lease.arena().size());
}

#[test]
fn first_and_last_pages_are_writable() {
    let arena = Arena::new(ARENA_SIZE).unwrap();
    let base = arena.base();

    // SAFETY: Both bytes are within the arena.
    unsafe {
        base.add(ARENA_SIZE - 1).write(0xAB);
        base.write(0xCD);
    }

    // SAFETY: As above.
    let (first, last) = unsafe { (base.read(), base.add(ARENA_SIZE - 1).read()) };

    assert_eq!(first, 0xCD);
    assert_eq!(last, 0xAB);
}
