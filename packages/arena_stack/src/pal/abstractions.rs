use std::fmt::Debug;
use std::io;
use std::num::NonZero;
use std::ptr::NonNull;

use crate::{DEFAULT_COMMIT_BATCH_PAGES, GrowthPolicy};

/// How a reservation grows its committed memory on platforms where committing is explicit.
///
/// Platforms that overcommit (Linux, macOS) ignore this - the operating system faults pages in
/// on first touch without any help from us.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct GrowthOptions {
    pub(crate) policy: GrowthPolicy,

    /// Number of pages committed by each fault we service. Committing in large batches
    /// amortizes the cost of taking the fault.
    pub(crate) commit_batch_pages: NonZero<usize>,
}

impl Default for GrowthOptions {
    fn default() -> Self {
        Self {
            policy: GrowthPolicy::default(),
            commit_batch_pages: DEFAULT_COMMIT_BATCH_PAGES,
        }
    }
}

/// Operations the arena layer needs from the operating system.
///
/// All PAL calls go through this trait, enabling them to be mocked.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Platform: Debug + Send + Sync + 'static {
    /// Reserves `size` bytes of address space that the caller may immediately write to anywhere
    /// in the range, with physical memory supplied on demand (or up front, if the platform has
    /// no way to do it on demand).
    fn reserve(&self, size: usize, growth: GrowthOptions) -> io::Result<NonNull<u8>>;

    /// Releases a range previously returned by `reserve()` with the same `size`.
    ///
    /// Must be called exactly once per reservation.
    fn release(&self, base: NonNull<u8>, size: usize);
}
