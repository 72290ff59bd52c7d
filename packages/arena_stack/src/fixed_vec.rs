use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;
use std::slice;

use crate::{ArenaPool, Carve, Result};

/// A read-only copy of a slice, stored in a range carved from a pooled arena.
///
/// Cheaper to create than a heap-allocated copy and, like all carved containers, only holds the
/// arena while it is being created. The elements are accessed through `Deref<Target = [T]>`.
///
/// # Example
///
/// ```
/// use arena_stack::{ArenaPool, FixedVec};
///
/// let pool = ArenaPool::builder().arena_size(1024 * 1024).build();
///
/// let source = vec![3, 1, 4, 1, 5];
/// let copy = FixedVec::from_slice_in(&pool, &source);
/// drop(source);
///
/// assert_eq!(&*copy, &[3, 1, 4, 1, 5]);
/// ```
pub struct FixedVec<'p, T> {
    items: NonNull<T>,
    len: usize,

    carve: Carve<'p>,
}

impl<T: Copy> FixedVec<'static, T> {
    /// Copies `source` into a range carved from the current thread's default pool.
    ///
    /// # Panics
    ///
    /// Panics if the pool cannot provide an arena with enough room left.
    #[must_use]
    pub fn from_slice(source: &[T]) -> Self {
        Self::from_slice_in(ArenaPool::current(), source)
    }
}

impl<'p, T: Copy> FixedVec<'p, T> {
    /// Copies `source` into a range carved from an arena of `pool`.
    ///
    /// # Panics
    ///
    /// Panics if the pool cannot provide an arena with enough room left.
    #[must_use]
    pub fn from_slice_in(pool: &'p ArenaPool, source: &[T]) -> Self {
        Self::try_from_slice_in(pool, source).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Copies `source` into a range carved from an arena of `pool`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot provide an arena or the arena does not have enough
    /// room left.
    pub fn try_from_slice_in(pool: &'p ArenaPool, source: &[T]) -> Result<Self> {
        const { assert!(size_of::<T>() != 0, "zero-sized element types are not supported") };

        // Cannot overflow - `source` already occupies this many bytes.
        let bytes = size_of_val(source);

        let carve = pool.carve(bytes, align_of::<T>())?;
        let items = carve.start().cast::<T>();

        // SAFETY: The carved range is aligned for `T`, has room for `source.len()` elements and
        // is ours alone. It cannot overlap `source`, which is initialized memory that nobody
        // else may carve.
        unsafe {
            items.copy_from_nonoverlapping(NonNull::from(source).cast::<T>(), source.len());
        }

        Ok(Self {
            items,
            len: source.len(),
            carve,
        })
    }
}

impl<T> FixedVec<'_, T> {
    /// The copied elements.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: All `len` elements were initialized when the vector was created and are never
        // modified afterwards.
        unsafe { slice::from_raw_parts(self.items.as_ptr(), self.len) }
    }
}

impl<T> Deref for FixedVec<'_, T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T: fmt::Debug> fmt::Debug for FixedVec<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedVec")
            .field("items", &self.as_slice())
            .field("carve", &self.carve)
            .finish()
    }
}
