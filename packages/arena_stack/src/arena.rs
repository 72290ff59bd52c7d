use std::cell::Cell;
use std::ptr::NonNull;

use crate::pal::{GrowthOptions, Platform, PlatformFacade};
use crate::{ArenaError, Result};

/// One large range of reserved address space with a single bump pointer.
///
/// The arena owns its reservation for its whole lifetime and releases it when dropped. The range
/// never moves, which is what allows containers built on top of an arena to hand out element
/// addresses that stay valid for as long as the element exists.
///
/// Physical memory is only supplied as pages are touched (or, on platforms without that
/// capability, committed up front), so it is normal to reserve far more than will ever be used.
///
/// Most code does not create arenas directly - containers such as [`ArenaVec`][1] lease them
/// from an [`ArenaPool`][2]. A standalone arena is useful together with
/// [`BumpVec::from_arena()`][3] when full control is desired.
///
/// # Example
///
/// ```
/// use arena_stack::{Arena, BumpVec};
///
/// let mut arena = Arena::new(1024 * 1024).unwrap();
///
/// let mut items = BumpVec::<u64>::from_arena(&mut arena);
/// items.push_back(42);
///
/// assert_eq!(items[0], 42);
/// ```
///
/// # Thread safety
///
/// Arenas are single-threaded (neither `Send` nor `Sync`).
///
/// [1]: crate::ArenaVec
/// [2]: crate::ArenaPool
/// [3]: crate::BumpVec::from_arena
#[derive(Debug)]
pub struct Arena {
    base: NonNull<u8>,
    size: usize,

    /// Offset of the bump pointer from `base`. Always `<= size`.
    ///
    /// Containers that lock the arena start at the bump pointer without moving it, while
    /// containers that carve a fixed range out of the arena move it past their range.
    used: Cell<usize>,

    /// Number of live carved ranges in the arena.
    carves: Cell<usize>,

    platform: PlatformFacade,
}

impl Arena {
    /// Reserves `size` bytes of address space for a new arena.
    ///
    /// # Errors
    ///
    /// Returns [`ArenaError::ReservationFailed`] if the operating system refuses the reservation.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize) -> Result<Self> {
        Self::reserve(PlatformFacade::target(), size, GrowthOptions::default())
    }

    pub(crate) fn reserve(
        platform: PlatformFacade,
        size: usize,
        growth: GrowthOptions,
    ) -> Result<Self> {
        assert!(size > 0, "arenas must have a non-zero size");

        let base = platform
            .reserve(size, growth)
            .map_err(|source| ArenaError::ReservationFailed { size, source })?;

        Ok(Self {
            base,
            size,
            used: Cell::new(0),
            carves: Cell::new(0),
            platform,
        })
    }

    /// The start of the reserved range.
    #[must_use]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// The current bump pointer. Everything at or after this address is free for use by whoever
    /// holds the arena.
    #[must_use]
    pub fn bump(&self) -> NonNull<u8> {
        // SAFETY: `used <= size`, so the result is within (or one past the end of) the range.
        unsafe { self.base.add(self.used.get()) }
    }

    /// Size of the reserved range in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of bytes before the bump pointer.
    #[must_use]
    pub fn used(&self) -> usize {
        self.used.get()
    }

    /// Number of bytes after the bump pointer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        // Cannot underflow - `used <= size` is an invariant of the type.
        self.size.wrapping_sub(self.used.get())
    }

    /// Whether `ptr` points into the reserved range.
    #[must_use]
    pub fn contains(&self, ptr: *const u8) -> bool {
        let base = self.base.addr().get();

        ptr.addr() >= base && ptr.addr().wrapping_sub(base) < self.size
    }

    pub(crate) fn set_used(&self, used: usize) {
        debug_assert!(used <= self.size, "bump pointer moved out of the arena");

        self.used.set(used);
    }

    /// Offset of the first address at or after the bump pointer that is aligned to `align`.
    ///
    /// May be greater than `size` if the arena is (nearly) full.
    pub(crate) fn aligned_free_offset(&self, align: usize) -> usize {
        let bump = self.bump().addr().get();

        let aligned = bump
            .checked_next_multiple_of(align)
            .expect("an aligned address past the end of the address space is not possible");

        // Cannot underflow - aligning up never moves below the bump pointer, which is >= base.
        aligned.wrapping_sub(self.base.addr().get())
    }

    pub(crate) fn carves(&self) -> usize {
        self.carves.get()
    }

    pub(crate) fn carve_created(&self) {
        // Cannot overflow - every carve is a live object in memory.
        self.carves.set(self.carves.get().wrapping_add(1));
    }

    pub(crate) fn carve_dropped(&self) {
        let carves = self.carves.get();

        debug_assert!(carves > 0, "more carved ranges dropped than created");

        self.carves.set(carves.saturating_sub(1));
    }

    /// A pointer to `offset` bytes into the arena.
    ///
    /// # Safety
    ///
    /// `offset` must not be greater than the size of the arena.
    pub(crate) unsafe fn at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset <= self.size);

        // SAFETY: Forwarding guarantee from the caller.
        unsafe { self.base.add(offset) }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        self.platform.release(self.base, self.size);
    }
}
