use std::io;
use std::ptr::{self, NonNull};

use tracing::{debug, warn};

use crate::pal::{GrowthOptions, Platform};

/// Platform that targets the operating system the build is targeting.
///
/// Anonymous private mappings on Linux and macOS are lazily backed by the kernel: a page gets
/// physical memory on first touch and `MAP_NORESERVE` keeps the mapping from being charged
/// against the commit limit up front. This means we never need to service faults ourselves and
/// any offset in the range may be written to in any order.
#[derive(Debug, Default)]
pub(crate) struct BuildTargetPlatform;

// Real OS calls are excluded from coverage measurement because error paths require OS-level
// failures that are impractical to trigger in tests.
#[cfg_attr(coverage_nightly, coverage(off))]
impl Platform for BuildTargetPlatform {
    fn reserve(&self, size: usize, _growth: GrowthOptions) -> io::Result<NonNull<u8>> {
        // SAFETY: An anonymous mapping without an address hint has no safety requirements.
        let mapping = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };

        if mapping == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let base = NonNull::new(mapping.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned a null mapping"))?;

        debug!(size, base = ?base, "reserved address space");

        Ok(base)
    }

    fn release(&self, base: NonNull<u8>, size: usize) {
        // SAFETY: The caller guarantees this is a mapping of `size` bytes that we created in
        // `reserve()` and that nothing will access it after this call.
        let result = unsafe { libc::munmap(base.as_ptr().cast(), size) };

        if result == 0 {
            debug!(size, base = ?base, "released address space");
        } else {
            warn!(
                size,
                base = ?base,
                error = %io::Error::last_os_error(),
                "failed to release address space"
            );
        }
    }
}
