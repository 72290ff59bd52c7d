/// Determines how an arena's reserved address space becomes backed by memory on platforms that
/// require memory to be committed before it is accessed (Windows).
///
/// Platforms that overcommit (Linux, macOS) always behave like [`RandomAccess`][1] and ignore
/// this setting.
///
/// # Examples
///
/// ```
/// use arena_stack::{ArenaPool, GrowthPolicy};
///
/// let pool = ArenaPool::builder()
///     .arena_size(64 * 1024 * 1024)
///     .growth_policy(GrowthPolicy::SequentialGuard)
///     .build();
/// ```
///
/// [1]: GrowthPolicy::RandomAccess
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum GrowthPolicy {
    /// Any offset of the arena may be touched first, in any order. A fault on an uncommitted page
    /// commits a batch of pages starting at that page. This is the default.
    #[default]
    RandomAccess,

    /// An inaccessible guard page sits right after the committed part of the arena and touching
    /// it commits the next batch. Only supports forward-sequential first access: touching a page
    /// beyond the guard page is a regular access violation.
    SequentialGuard,
}
