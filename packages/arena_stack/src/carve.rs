use std::ptr::NonNull;

use tracing::warn;

use crate::{Arena, ArenaError, Result};

/// A fixed range carved out of a pooled arena, right at the arena's bump pointer.
///
/// The arena is only locked for the moment it takes to carve the range, so the carved range
/// shares the arena with whoever leases it next - the next lease simply starts after the range.
/// When dropped, the arena's bump pointer is moved back to where it was before the range was
/// carved, making the bytes available again.
///
/// This is the backing of [`CappedVec`][1] and [`FixedVec`][2] and cannot be created directly.
///
/// # Drop order
///
/// The bump pointer is only moved back if nothing has been carved from the same arena after this
/// range (i.e. carved ranges are dropped in reverse order of creation, as local variables are).
/// Otherwise the bytes are left in place. They only become available again once a range carved
/// before them is dropped and moves the bump pointer below them.
///
/// [1]: crate::CappedVec
/// [2]: crate::FixedVec
#[derive(Debug)]
pub struct Carve<'p> {
    arena: &'p Arena,

    /// Arena bump offset from before the range was carved, including any alignment padding.
    restore_to: usize,

    start: usize,
    end: usize,
}

impl<'p> Carve<'p> {
    /// Carves `bytes` bytes aligned to `align` from the bump pointer of `arena`.
    ///
    /// The caller must hold the lease on the arena while calling this.
    pub(crate) fn new(arena: &'p Arena, bytes: usize, align: usize) -> Result<Self> {
        let restore_to = arena.used();
        let start = arena.aligned_free_offset(align);

        let end = start
            .checked_add(bytes)
            .filter(|end| *end <= arena.size())
            .ok_or_else(|| ArenaError::ArenaFull {
                requested: start.saturating_sub(restore_to).saturating_add(bytes),
                remaining: arena.remaining(),
            })?;

        arena.set_used(end);
        arena.carve_created();

        Ok(Self {
            arena,
            restore_to,
            start,
            end,
        })
    }

    /// The first byte of the carved range.
    pub(crate) fn start(&self) -> NonNull<u8> {
        // SAFETY: `start <= end <= size` was checked when carving.
        unsafe { self.arena.at(self.start) }
    }

    /// The arena the range was carved from.
    pub(crate) fn arena(&self) -> &'p Arena {
        self.arena
    }
}

impl Drop for Carve<'_> {
    fn drop(&mut self) {
        self.arena.carve_dropped();

        if self.arena.used() == self.end {
            self.arena.set_used(self.restore_to);
        } else {
            warn!(
                start = self.start,
                end = self.end,
                bump = self.arena.used(),
                "carved range dropped out of order, its bytes stay reserved"
            );
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn carve_moves_bump_and_restores_it() {
        let arena = Arena::new(4096).unwrap();
        arena.set_used(1);

        let carve = Carve::new(&arena, 100, 8).unwrap();

        assert_eq!(carve.start(), unsafe_at(&arena, 8));
        assert_eq!(arena.used(), 108);

        drop(carve);

        assert_eq!(arena.used(), 1);
    }

    #[test]
    fn nested_carves_unwind_in_order() {
        let arena = Arena::new(4096).unwrap();

        let outer = Carve::new(&arena, 64, 8).unwrap();
        let inner = Carve::new(&arena, 64, 8).unwrap();

        assert_eq!(arena.used(), 128);

        drop(inner);
        assert_eq!(arena.used(), 64);

        drop(outer);
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn out_of_order_drop_keeps_later_range_intact() {
        let arena = Arena::new(4096).unwrap();

        let first = Carve::new(&arena, 64, 8).unwrap();
        let second = Carve::new(&arena, 64, 8).unwrap();

        drop(first);

        // The second range must not become available while it is still alive.
        assert_eq!(arena.used(), 128);

        drop(second);
        assert_eq!(arena.used(), 64);
    }

    #[test]
    fn arena_counts_live_carves() {
        let arena = Arena::new(4096).unwrap();

        let empty = Carve::new(&arena, 0, 1).unwrap();

        // An empty range does not move the bump pointer but still refers to the arena.
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.carves(), 1);

        let full = Carve::new(&arena, 16, 8).unwrap();
        assert_eq!(arena.carves(), 2);

        drop(full);
        drop(empty);

        assert_eq!(arena.carves(), 0);
    }

    #[test]
    fn oversized_carve_is_rejected() {
        let arena = Arena::new(4096).unwrap();

        let result = Carve::new(&arena, 4097, 1);

        assert!(matches!(
            result,
            Err(ArenaError::ArenaFull {
                requested: 4097,
                remaining: 4096
            })
        ));
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.carves(), 0);
    }

    fn unsafe_at(arena: &Arena, offset: usize) -> NonNull<u8> {
        // SAFETY: Test offsets are within the arena.
        unsafe { arena.at(offset) }
    }
}
