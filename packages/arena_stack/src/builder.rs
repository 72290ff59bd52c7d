use std::num::NonZero;

use crate::pal::{GrowthOptions, PlatformFacade};
use crate::{ArenaPool, GrowthPolicy};

/// Address space reserved for each arena by default.
///
/// This is cheap because it is only address space - physical memory is supplied as pages are
/// touched. Platforms where we have to commit everything up front get a much smaller default.
#[cfg(all(
    target_pointer_width = "64",
    not(miri),
    any(target_os = "linux", target_os = "macos", windows)
))]
pub(crate) const DEFAULT_ARENA_SIZE: usize = 1 << 36;

#[cfg(all(
    not(target_pointer_width = "64"),
    not(miri),
    any(target_os = "linux", target_os = "macos", windows)
))]
pub(crate) const DEFAULT_ARENA_SIZE: usize = 256 * 1024 * 1024;

#[cfg(any(miri, not(any(target_os = "linux", target_os = "macos", windows))))]
pub(crate) const DEFAULT_ARENA_SIZE: usize = 16 * 1024 * 1024;

/// How many arenas a pool may materialize by default.
///
/// Only reached if containers are not used in a scope-nested pattern, so this is generous.
#[cfg(not(miri))]
pub(crate) const DEFAULT_MAX_ARENAS: NonZero<usize> = NonZero::new(1024).unwrap();

// Under Miri, we use fewer arenas because Miri test runtime scales by memory usage.
#[cfg(miri)]
pub(crate) const DEFAULT_MAX_ARENAS: NonZero<usize> = NonZero::new(8).unwrap();

/// Pages committed per serviced page fault on platforms that need explicit commits.
pub(crate) const DEFAULT_COMMIT_BATCH_PAGES: NonZero<usize> = NonZero::new(256).unwrap();

/// Builder for creating an instance of [`ArenaPool`].
///
/// You only need to use this builder if you want to customize the pool configuration.
/// The default configuration used by [`ArenaPool::new()`][1] is sufficient for most use cases.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use arena_stack::ArenaPool;
///
/// let pool = ArenaPool::builder()
///     .arena_size(16 * 1024 * 1024)
///     .max_arenas(NonZero::new(4).unwrap())
///     .build();
///
/// assert_eq!(pool.max_arenas(), 4);
/// ```
///
/// [1]: ArenaPool::new
#[derive(Debug)]
#[must_use]
pub struct ArenaPoolBuilder {
    arena_size: usize,
    max_arenas: NonZero<usize>,
    growth: GrowthOptions,
    platform: PlatformFacade,
}

impl ArenaPoolBuilder {
    pub(crate) const fn new() -> Self {
        Self {
            arena_size: DEFAULT_ARENA_SIZE,
            max_arenas: DEFAULT_MAX_ARENAS,
            growth: GrowthOptions {
                policy: GrowthPolicy::RandomAccess,
                commit_batch_pages: DEFAULT_COMMIT_BATCH_PAGES,
            },
            platform: PlatformFacade::target(),
        }
    }

    /// Sets how many bytes of address space each arena reserves.
    ///
    /// This is the upper bound on how much a single container can grow to. The default is
    /// 64 GiB on 64-bit platforms with lazily committed memory.
    pub fn arena_size(mut self, bytes: usize) -> Self {
        self.arena_size = bytes;
        self
    }

    /// Sets the maximum number of arenas the pool may materialize, which is also the maximum
    /// number of arenas that can be leased at the same time. The default is 1024.
    pub fn max_arenas(mut self, count: NonZero<usize>) -> Self {
        self.max_arenas = count;
        self
    }

    /// Sets how many pages are committed at once when growing an arena on platforms that
    /// need explicit commits. The default is 256.
    pub fn commit_batch_pages(mut self, pages: NonZero<usize>) -> Self {
        self.growth.commit_batch_pages = pages;
        self
    }

    /// Sets the [growth policy][GrowthPolicy] of the pool's arenas.
    pub fn growth_policy(mut self, policy: GrowthPolicy) -> Self {
        self.growth.policy = policy;
        self
    }

    #[cfg(test)]
    pub(crate) fn platform(mut self, platform: PlatformFacade) -> Self {
        self.platform = platform;
        self
    }

    /// Builds the arena pool with the specified configuration.
    ///
    /// No address space is reserved until the first arena is acquired.
    ///
    /// # Panics
    ///
    /// Panics if the arena size is zero.
    #[must_use]
    pub fn build(self) -> ArenaPool {
        assert!(self.arena_size > 0, "arenas must have a non-zero size");

        ArenaPool::new_inner(
            self.arena_size,
            self.max_arenas,
            self.growth,
            self.platform,
        )
    }
}
