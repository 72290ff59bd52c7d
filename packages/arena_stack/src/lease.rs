use std::fmt;

use crate::{Arena, ArenaPool};

/// Exclusive right to grow into an [`Arena`] leased from an [`ArenaPool`].
///
/// Returned by [`ArenaPool::acquire()`]. The arena is returned to the pool when the lease is
/// dropped. Leases must be dropped in the reverse order they were acquired in - this happens
/// naturally when leases (or the containers that hold them) are local variables in nested
/// scopes. Dropping a lease out of order panics.
///
/// While a lease is alive, no other lease can be granted for the same arena, so the holder is
/// the only one that may write past the arena's bump pointer.
///
/// # Example
///
/// ```
/// use arena_stack::{ArenaPool, BumpVec};
///
/// let pool = ArenaPool::builder().arena_size(1024 * 1024).build();
///
/// let mut lease = pool.acquire();
/// let mut numbers = BumpVec::<u32>::from_lease(&mut lease);
///
/// numbers.push_back(1);
/// numbers.push_back(2);
///
/// assert_eq!(numbers.as_slice(), &[1, 2]);
/// ```
pub struct ArenaLease<'p> {
    pool: &'p ArenaPool,
    arena: &'p Arena,

    /// How many leases on the same pool were alive when this one was granted. Also the index
    /// of the leased arena in the pool.
    depth: usize,
}

impl<'p> ArenaLease<'p> {
    pub(crate) fn new(pool: &'p ArenaPool, arena: &'p Arena, depth: usize) -> Self {
        Self { pool, arena, depth }
    }

    /// The leased arena.
    #[must_use]
    pub fn arena(&self) -> &Arena {
        self.arena
    }

    /// The leased arena, for as long as the pool lives.
    ///
    /// Must not be handed out to users, as the pool may release the arena once the lease and all
    /// carved ranges are gone.
    pub(crate) fn leased_arena(&self) -> &'p Arena {
        self.arena
    }

    /// The nesting depth of this lease: how many other leases on the same pool were alive when
    /// this one was granted.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl Drop for ArenaLease<'_> {
    fn drop(&mut self) {
        self.pool.release(self.depth);
    }
}

impl fmt::Debug for ArenaLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaLease")
            .field("depth", &self.depth)
            .field("arena", &self.arena)
            .finish_non_exhaustive()
    }
}
