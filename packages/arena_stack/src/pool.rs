use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::num::NonZero;
use std::ptr::NonNull;

use tracing::{debug, warn};

#[cfg(test)]
use crate::pal::memory_backed_platform;
use crate::pal::{GrowthOptions, PlatformFacade};
use crate::{Arena, ArenaError, ArenaLease, ArenaPoolBuilder, Carve, Result};

thread_local! {
    /// The pool used by containers that are not explicitly given one. Like any pool it is
    /// single-threaded, so every thread gets its own.
    ///
    /// The pool itself is never freed, so references to it stay valid even in thread-local
    /// destructors. Its arenas are released by `RELEASE_ON_EXIT` when the thread exits.
    static CURRENT: &'static ArenaPool = Box::leak(Box::new(ArenaPool::new()));

    static RELEASE_ON_EXIT: ReleaseOnExit = const { ReleaseOnExit };
}

/// Releases the arenas of the current thread's default pool when dropped, which happens when the
/// thread exits.
struct ReleaseOnExit;

impl Drop for ReleaseOnExit {
    fn drop(&mut self) {
        let pool = CURRENT.with(|pool| *pool);

        if !pool.release_arenas() {
            warn!(
                locked = pool.locked(),
                allocated = pool.allocated(),
                "default arena pool is still in use at thread exit, its arenas stay reserved"
            );
        }
    }
}

/// A bounded, lazily grown set of reusable [`Arena`]s, leased out in strictly nested order.
///
/// Containers lease an arena for as long as they may grow without a known bound
/// ([`ArenaVec`][1]), or just long enough to carve a fixed range out of it
/// ([`CappedVec`][2], [`FixedVec`][3]). Arenas are materialized the first time they are
/// needed and kept for reuse after their lease ends, so in steady state acquiring an arena is a
/// couple of counter updates.
///
/// # Nesting
///
/// The pool behaves like a stack: [`acquire()`][4] always leases the arena right after the most
/// recently leased one and leases must be dropped in the reverse order they were acquired in.
/// Local variables in nested scopes satisfy this automatically. Dropping a lease out of order
/// panics, as it would allow two containers to write into the same memory.
///
/// # Resource usage
///
/// Each arena reserves [`arena_size()`][5] bytes of address space. Physical memory is only used
/// for the parts of the arena that have been written to. The number of arenas is limited by
/// [`max_arenas()`][6] - reaching the limit is considered a usage error.
///
/// The arenas are released when the pool is dropped. The default pool of a thread is never
/// dropped; instead its arenas are released when the thread exits, unless a container still
/// uses one of them at that point (e.g. a container stored in a thread-local variable).
///
/// # Thread safety
///
/// The pool is single-threaded (neither `Send` nor `Sync`). Each thread has its own default
/// pool, accessible via [`current()`][7].
///
/// # Example
///
/// ```
/// use arena_stack::{ArenaPool, ArenaVec};
///
/// let pool = ArenaPool::builder().arena_size(1024 * 1024).build();
///
/// let mut outer = ArenaVec::<u32>::new_in(&pool);
/// outer.push_back(1);
///
/// {
///     // Leases the next arena, because the first one is held by `outer`.
///     let mut inner = ArenaVec::<u32>::new_in(&pool);
///     inner.push_back(2);
///
///     assert_eq!(pool.locked(), 2);
/// }
///
/// assert_eq!(pool.locked(), 1);
/// assert_eq!(pool.allocated(), 2);
/// ```
///
/// [1]: crate::ArenaVec
/// [2]: crate::CappedVec
/// [3]: crate::FixedVec
/// [4]: Self::acquire
/// [5]: Self::arena_size
/// [6]: Self::max_arenas
/// [7]: Self::current
pub struct ArenaPool {
    /// Materialized arenas, in index order. Arena `i` is leased if `i < locked`.
    ///
    /// Each arena is a separate heap allocation owned by the pool, so it stays in place while
    /// the list grows. Arenas are only freed when the pool is dropped or by `release_arenas()`,
    /// which requires that no lease or carved range refers to any of them.
    arenas: RefCell<Vec<NonNull<Arena>>>,

    /// Number of currently leased arenas.
    locked: Cell<usize>,

    max_arenas: NonZero<usize>,
    arena_size: usize,
    growth: GrowthOptions,
    platform: PlatformFacade,
}

impl ArenaPool {
    /// Creates a new pool with the default configuration.
    ///
    /// No address space is reserved until the first arena is acquired.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a new [`ArenaPool`].
    ///
    /// Use this when you want to customize the pool configuration beyond the defaults.
    pub fn builder() -> ArenaPoolBuilder {
        ArenaPoolBuilder::new()
    }

    /// The default pool of the current thread, used by containers that are not explicitly
    /// given a pool (e.g. [`ArenaVec::new()`][1]).
    ///
    /// [1]: crate::ArenaVec::new
    #[must_use]
    pub fn current() -> &'static Self {
        // Fails once the thread has started tearing down its thread-local variables, in which
        // case anything materialized from now on stays reserved.
        _ = RELEASE_ON_EXIT.try_with(|_| {});

        CURRENT.with(|pool| *pool)
    }

    pub(crate) fn new_inner(
        arena_size: usize,
        max_arenas: NonZero<usize>,
        growth: GrowthOptions,
        platform: PlatformFacade,
    ) -> Self {
        Self {
            arenas: RefCell::new(Vec::new()),
            locked: Cell::new(0),
            max_arenas,
            arena_size,
            growth,
            platform,
        }
    }

    /// Leases the next arena, materializing it if this is the deepest nesting level so far.
    ///
    /// # Panics
    ///
    /// Panics if all [`max_arenas()`][1] arenas are already leased or if the operating system
    /// refuses to reserve address space for a new arena. Use [`try_acquire()`][2] to handle
    /// these conditions.
    ///
    /// [1]: Self::max_arenas
    /// [2]: Self::try_acquire
    #[must_use = "the arena is returned to the pool as soon as the lease is dropped"]
    pub fn acquire(&self) -> ArenaLease<'_> {
        self.try_acquire().unwrap_or_else(|e| panic!("{e}"))
    }

    /// Leases the next arena, materializing it if this is the deepest nesting level so far.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::PoolExhausted`] if all [`max_arenas()`][1] arenas are already leased
    /// and [`ArenaError::ReservationFailed`] if a new arena could not be reserved.
    ///
    /// [1]: Self::max_arenas
    pub fn try_acquire(&self) -> Result<ArenaLease<'_>> {
        let depth = self.locked.get();

        if depth == self.allocated() {
            self.materialize()?;
        }

        let arena = self
            .arena(depth)
            .expect("arenas below the allocated count are always materialized");

        // Cannot overflow - bounded by the length of `arenas`.
        self.locked.set(depth.wrapping_add(1));

        Ok(ArenaLease::new(self, arena, depth))
    }

    fn arena(&self, index: usize) -> Option<&Arena> {
        let arena = *self.arenas.borrow().get(index)?;

        // SAFETY: The arena stays at this address until the pool is dropped or the arena is
        // released, neither of which can happen while the returned reference borrows the pool
        // or a lease or carved range holds it.
        Some(unsafe { arena.as_ref() })
    }

    #[cfg_attr(test, mutants::skip)] // Mutations only change when memory is reserved.
    fn materialize(&self) -> Result<()> {
        let index = self.allocated();

        if index >= self.max_arenas.get() {
            return Err(ArenaError::PoolExhausted {
                max_arenas: self.max_arenas.get(),
            });
        }

        let arena = Arena::reserve(self.platform.clone(), self.arena_size, self.growth)?;

        debug!(index, size = self.arena_size, "materialized arena");

        self.arenas
            .borrow_mut()
            .push(NonNull::from(Box::leak(Box::new(arena))));

        Ok(())
    }

    /// Releases the address space of all materialized arenas if none of them is leased or has
    /// ranges carved from it. Returns whether the arenas were released.
    ///
    /// Arenas are materialized again when they are next needed.
    pub(crate) fn release_arenas(&self) -> bool {
        if self.locked.get() != 0 {
            return false;
        }

        let mut arenas = self.arenas.borrow_mut();

        // SAFETY: See `arena()`.
        if arenas.iter().any(|arena| unsafe { arena.as_ref() }.carves() != 0) {
            return false;
        }

        let count = arenas.len();

        for arena in mem::take(&mut *arenas) {
            // SAFETY: The arena was leaked by `materialize()` and we just removed it from the
            // pool, so it is freed once. Nothing is leased or carved, so nothing refers to it.
            drop(unsafe { Box::from_raw(arena.as_ptr()) });
        }

        debug!(count, "released arenas");

        true
    }

    pub(crate) fn release(&self, depth: usize) {
        let locked = self.locked.get();

        assert!(
            depth.checked_add(1) == Some(locked),
            "arena leases must be released in reverse order of acquisition - releasing lease at depth {depth} while {locked} leases are held"
        );

        self.locked.set(depth);
    }

    /// Carves `bytes` bytes aligned to `align` from the next arena without keeping it leased.
    pub(crate) fn carve(&self, bytes: usize, align: usize) -> Result<Carve<'_>> {
        let lease = self.try_acquire()?;

        // The carved range outlives the lease - that is the point.
        Carve::new(lease.leased_arena(), bytes, align)
    }

    /// Number of arenas that have been materialized so far.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.arenas.borrow().len()
    }

    /// Number of arenas that are currently leased.
    #[must_use]
    pub fn locked(&self) -> usize {
        self.locked.get()
    }

    /// The maximum number of arenas the pool may materialize.
    #[must_use]
    pub fn max_arenas(&self) -> usize {
        self.max_arenas.get()
    }

    /// Number of bytes of address space reserved by each arena.
    #[must_use]
    pub fn arena_size(&self) -> usize {
        self.arena_size
    }
}

impl Default for ArenaPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ArenaPool {
    fn drop(&mut self) {
        for arena in self.arenas.get_mut().drain(..) {
            // SAFETY: The arena was leaked by `materialize()` and is freed once here. Leases and
            // carved ranges borrow the pool, so none of them can refer to it any more.
            drop(unsafe { Box::from_raw(arena.as_ptr()) });
        }
    }
}

impl fmt::Debug for ArenaPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaPool")
            .field("allocated", &self.allocated())
            .field("locked", &self.locked.get())
            .field("max_arenas", &self.max_arenas)
            .field("arena_size", &self.arena_size)
            .field("growth", &self.growth)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
impl ArenaPool {
    /// A small pool whose arenas are plain leaked heap buffers.
    pub(crate) fn with_mock_platform(arena_size: usize, max_arenas: usize) -> Self {
        Self::builder()
            .arena_size(arena_size)
            .max_arenas(NonZero::new(max_arenas).expect("test pools have at least one arena"))
            .platform(PlatformFacade::from_mock(memory_backed_platform()))
            .build()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::io;
    use std::ptr;

    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::pal::{MockPlatform, leaked_buffer};

    assert_not_impl_any!(ArenaPool: Send, Sync);
    assert_not_impl_any!(ArenaLease<'static>: Send, Sync);

    fn mock_pool(max_arenas: usize) -> ArenaPool {
        ArenaPool::with_mock_platform(4096, max_arenas)
    }

    #[test]
    fn nested_acquire_release_reuses_arenas() {
        let pool = mock_pool(4);

        let (first_a, first_b) = {
            let a = pool.acquire();
            let b = pool.acquire();

            assert!(!ptr::eq(a.arena(), b.arena()));
            assert_eq!(a.depth(), 0);
            assert_eq!(b.depth(), 1);
            assert_eq!(pool.locked(), 2);

            (ptr::from_ref(a.arena()), ptr::from_ref(b.arena()))
        };

        assert_eq!(pool.locked(), 0);
        assert_eq!(pool.allocated(), 2);

        let a = pool.acquire();
        let b = pool.acquire();

        assert!(ptr::eq(a.arena(), first_a));
        assert!(ptr::eq(b.arena(), first_b));
        assert_eq!(pool.allocated(), 2);
    }

    #[test]
    fn arenas_are_materialized_lazily() {
        let pool = mock_pool(4);

        assert_eq!(pool.allocated(), 0);

        drop(pool.acquire());
        drop(pool.acquire());

        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn acquire_up_to_limit_then_fail() {
        let pool = mock_pool(3);

        let a = pool.acquire();
        let b = pool.acquire();
        let c = pool.acquire();

        assert!(matches!(
            pool.try_acquire(),
            Err(ArenaError::PoolExhausted { max_arenas: 3 })
        ));

        // A failed acquisition does not disturb the counters.
        assert_eq!(pool.locked(), 3);

        drop(c);
        drop(b);
        drop(a);
    }

    #[test]
    #[should_panic]
    fn acquire_beyond_limit_panics() {
        let pool = mock_pool(1);

        let _a = pool.acquire();
        let _b = pool.acquire();
    }

    #[test]
    #[should_panic]
    fn out_of_order_release_panics() {
        let pool = mock_pool(2);

        let a = pool.acquire();
        let b = pool.acquire();

        drop(a);
        drop(b);
    }

    #[test]
    fn reservation_failure_is_reported_and_recoverable() {
        let mut platform = MockPlatform::new();
        platform
            .expect_reserve()
            .returning(|_, _| Err(io::Error::from(io::ErrorKind::OutOfMemory)));

        let pool = ArenaPool::builder()
            .arena_size(4096)
            .platform(PlatformFacade::from_mock(platform))
            .build();

        assert!(matches!(
            pool.try_acquire(),
            Err(ArenaError::ReservationFailed { size: 4096, .. })
        ));
        assert_eq!(pool.allocated(), 0);
        assert_eq!(pool.locked(), 0);
    }

    #[test]
    fn carve_does_not_keep_arena_locked() {
        let pool = mock_pool(2);

        let carve = pool.carve(128, 8).unwrap();

        assert_eq!(pool.locked(), 0);
        assert_eq!(carve.arena().used(), 128);

        // The next lease shares the arena and starts after the carved range.
        let lease = pool.acquire();
        assert!(ptr::eq(lease.arena(), carve.arena()));
        assert_eq!(lease.arena().used(), 128);
    }

    #[test]
    fn release_arenas_frees_idle_arenas() {
        let mut platform = MockPlatform::new();
        platform
            .expect_reserve()
            .times(3)
            .returning(|size, _| Ok(leaked_buffer(size)));
        platform.expect_release().times(3).return_const(());

        let pool = ArenaPool::builder()
            .arena_size(4096)
            .platform(PlatformFacade::from_mock(platform))
            .build();

        {
            let _a = pool.acquire();
            let _b = pool.acquire();
        }

        assert_eq!(pool.allocated(), 2);
        assert!(pool.release_arenas());
        assert_eq!(pool.allocated(), 0);

        // The pool keeps working, materializing a fresh arena.
        let lease = pool.acquire();
        assert_eq!(pool.allocated(), 1);
        assert_eq!(lease.arena().used(), 0);
    }

    #[test]
    fn release_arenas_refuses_while_leased() {
        let pool = mock_pool(2);

        let lease = pool.acquire();

        assert!(!pool.release_arenas());
        assert_eq!(pool.allocated(), 1);

        drop(lease);

        assert!(pool.release_arenas());
    }

    #[test]
    fn release_arenas_refuses_while_carved() {
        let pool = mock_pool(2);

        // Even an empty range refers to its arena.
        let carve = pool.carve(0, 1).unwrap();

        assert_eq!(pool.locked(), 0);
        assert!(!pool.release_arenas());
        assert_eq!(pool.allocated(), 1);

        drop(carve);

        assert!(pool.release_arenas());
        assert_eq!(pool.allocated(), 0);
    }

    #[test]
    fn default_pool_arenas_are_released_on_thread_exit() {
        std::thread::spawn(|| {
            let pool = ArenaPool::current();

            {
                let _a = pool.acquire();
                let _b = pool.acquire();
            }

            assert_eq!(pool.allocated(), 2);

            // Same as what happens when the thread-local guard is destroyed.
            drop(ReleaseOnExit);

            assert_eq!(pool.allocated(), 0);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn default_pool_in_use_at_thread_exit_keeps_arenas() {
        std::thread::spawn(|| {
            let pool = ArenaPool::current();
            let lease = pool.acquire();

            drop(ReleaseOnExit);

            assert_eq!(pool.allocated(), 1);
            assert_eq!(lease.arena().used(), 0);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn current_pool_is_per_thread() {
        let here = ptr::from_ref(ArenaPool::current()).addr();
        let there = std::thread::spawn(|| ptr::from_ref(ArenaPool::current()).addr())
            .join()
            .unwrap();

        assert_eq!(here, ptr::from_ref(ArenaPool::current()).addr());
        assert_ne!(here, there);
    }
}
