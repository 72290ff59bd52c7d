use std::alloc::{self, Layout};
use std::io;
use std::ptr::NonNull;

use tracing::debug;

use crate::pal::{GrowthOptions, Platform};

/// Alignment of fallback reservations, chosen to match the common page size so that arenas have
/// the same alignment guarantees as real reservations.
const RESERVATION_ALIGNMENT: usize = 4096;

/// Fallback platform for operating systems without native support (and for Miri).
///
/// There is no portable way to obtain lazily-backed address space, so this implementation emulates
/// it by committing the entire reservation up front from the global allocator. Everything above
/// the PAL behaves identically, it just costs real memory. Pools used on such platforms should be
/// configured with a modest arena size.
#[derive(Debug, Default)]
pub(crate) struct BuildTargetPlatform;

fn reservation_layout(size: usize) -> io::Result<Layout> {
    Layout::from_size_align(size, RESERVATION_ALIGNMENT)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

impl Platform for BuildTargetPlatform {
    fn reserve(&self, size: usize, _growth: GrowthOptions) -> io::Result<NonNull<u8>> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot reserve an empty range",
            ));
        }

        let layout = reservation_layout(size)?;

        // SAFETY: The layout has a non-zero size, checked above.
        let base = NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
            .ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))?;

        debug!(size, base = ?base, "committed fallback reservation");

        Ok(base)
    }

    fn release(&self, base: NonNull<u8>, size: usize) {
        let layout = reservation_layout(size)
            .expect("layout was valid when the reservation was made, so it is still valid now");

        // SAFETY: The caller guarantees this is a reservation of `size` bytes that we allocated
        // in `reserve()` with the same layout and that nothing will access it after this call.
        unsafe {
            alloc::dealloc(base.as_ptr(), layout);
        }

        debug!(size, base = ?base, "released fallback reservation");
    }
}
