use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::slice;

use crate::{Arena, ArenaLease, ArenaPool, Carve, Result};

/// Backing of a [`BumpVec`] that views memory it does not own, such as the free part of an arena
/// held by the caller.
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct Borrowed;

/// A growable vector of `Copy` elements that occupies a fixed, never-moving range of memory.
///
/// The vector starts at a fixed address and grows toward higher addresses up to its capacity.
/// It never reallocates, so a reference or pointer to an element stays valid (and keeps pointing
/// to the same slot) for as long as the vector exists, no matter how many elements are pushed
/// after it.
///
/// The `B` type parameter determines where the memory comes from and what happens to it when the
/// vector is dropped:
///
/// * [`Borrowed`] - a view over memory held by someone else. See [`from_lease()`][1],
///   [`from_arena()`][2] and [`from_raw_parts()`][3].
/// * [`ArenaLease`] - the vector leases an arena from a pool and may grow to fill it. This is
///   [`ArenaVec`].
/// * [`Carve`] - the vector carves a fixed capacity from an arena and releases the arena right
///   away. This is [`CappedVec`].
///
/// All variants dereference to a slice, which provides indexing and iteration.
///
/// # Capacity
///
/// Pushing beyond the capacity panics. For hot loops where the capacity has been checked up front,
/// [`push_back_unchecked()`][4] and [`push_multiple_unchecked()`][5] skip the check in release
/// builds.
///
/// # Example
///
/// ```
/// use arena_stack::{ArenaPool, ArenaVec};
///
/// let pool = ArenaPool::builder().arena_size(1024 * 1024).build();
/// let mut items = ArenaVec::<u32>::new_in(&pool);
///
/// items.push_back(1);
/// items.push_multiple(&[2, 3, 4]);
///
/// let second: *const u32 = &items[1];
///
/// for i in 5..10_000 {
///     items.push_back(i);
/// }
///
/// assert_eq!(second, &items[1] as *const u32);
/// assert_eq!(*items.pop(), 9_999);
/// assert_eq!(*items.back(), 9_998);
/// ```
///
/// [1]: Self::from_lease
/// [2]: Self::from_arena
/// [3]: Self::from_raw_parts
/// [4]: Self::push_back_unchecked
/// [5]: Self::push_multiple_unchecked
pub struct BumpVec<'a, T, B = Borrowed> {
    begin: NonNull<T>,
    len: usize,
    capacity: usize,

    // Only held for its drop logic, which returns the memory.
    backing: B,

    _arena: PhantomData<&'a Arena>,
}

/// A [`BumpVec`] that leases an arena from an [`ArenaPool`] for its whole lifetime and can grow
/// until the arena is full.
///
/// The arena is returned to the pool when the vector is dropped, so vectors must be dropped in
/// the reverse order of creation (as local variables in nested scopes are).
pub type ArenaVec<'p, T> = BumpVec<'p, T, ArenaLease<'p>>;

/// A [`BumpVec`] with a fixed capacity, carved from the bump pointer of a pooled arena.
///
/// Unlike [`ArenaVec`], a capped vector only holds the arena while it is being created. Later
/// containers share the arena, starting after the carved range.
///
/// # Example
///
/// ```
/// use arena_stack::{ArenaPool, CappedVec};
///
/// let pool = ArenaPool::builder().arena_size(1024 * 1024).build();
///
/// let mut squares = CappedVec::<u64>::with_capacity_in(&pool, 10);
///
/// for i in 0..10 {
///     squares.push_back(i * i);
/// }
///
/// assert_eq!(squares.len(), squares.capacity());
/// ```
pub type CappedVec<'p, T> = BumpVec<'p, T, Carve<'p>>;

impl<T: Copy, B> BumpVec<'_, T, B> {
    fn from_parts(begin: NonNull<T>, capacity: usize, backing: B) -> Self {
        const { assert!(size_of::<T>() != 0, "zero-sized element types are not supported") };

        Self {
            begin,
            len: 0,
            capacity,
            backing,
            _arena: PhantomData,
        }
    }

    /// Covers the free part of `arena`, starting at its bump pointer.
    fn over_free_space(arena: &Arena, backing: B) -> Self {
        let start = arena.aligned_free_offset(align_of::<T>());

        let Some(free) = arena.size().checked_sub(start) else {
            return Self::from_parts(NonNull::dangling(), 0, backing);
        };

        // SAFETY: We just checked that `start` is within the arena.
        let begin = unsafe { arena.at(start) }.cast::<T>();

        let capacity = free
            .checked_div(size_of::<T>())
            .expect("zero-sized element types are rejected when the vector is created");

        Self::from_parts(begin, capacity, backing)
    }

    /// Number of elements in the vector.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the vector has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements the vector can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends an element to the end of the vector.
    ///
    /// # Panics
    ///
    /// Panics if the vector is full.
    pub fn push_back(&mut self, value: T) {
        assert!(
            self.len < self.capacity,
            "cannot push to a vector that is at its capacity of {} elements",
            self.capacity
        );

        // SAFETY: We just checked that there is room.
        unsafe {
            self.push_back_unchecked(value);
        }
    }

    /// Appends an element to the end of the vector without checking the capacity in release
    /// builds.
    ///
    /// # Safety
    ///
    /// The vector must not be full.
    pub unsafe fn push_back_unchecked(&mut self, value: T) {
        debug_assert!(self.len < self.capacity, "vector is full");

        // SAFETY: The caller guarantees `len < capacity`, so the slot is in our range.
        let slot = unsafe { self.begin.add(self.len) };

        // SAFETY: The slot is in our range and nobody else accesses our range.
        unsafe {
            slot.write(value);
        }

        // Cannot overflow - bounded by capacity.
        self.len = self.len.wrapping_add(1);
    }

    /// Appends all elements of `values` to the end of the vector.
    ///
    /// # Panics
    ///
    /// Panics if the elements do not fit.
    pub fn push_multiple(&mut self, values: &[T]) {
        // Cannot underflow - `len <= capacity` is an invariant of the type.
        let available = self.capacity.wrapping_sub(self.len);

        assert!(
            values.len() <= available,
            "cannot push {} elements to a vector with room for {available} more",
            values.len()
        );

        // SAFETY: We just checked that there is room.
        unsafe {
            self.push_multiple_unchecked(values);
        }
    }

    /// Appends all elements of `values` to the end of the vector without checking the capacity
    /// in release builds.
    ///
    /// # Safety
    ///
    /// The vector must have room for all of `values`.
    pub unsafe fn push_multiple_unchecked(&mut self, values: &[T]) {
        debug_assert!(
            values.len() <= self.capacity.wrapping_sub(self.len),
            "vector does not have room for the elements"
        );

        // SAFETY: The caller guarantees there is room, so the destination is in our range.
        let destination = unsafe { self.begin.add(self.len) };

        // SAFETY: The destination has room for `values.len()` elements. It cannot overlap
        // `values` because it is not initialized yet, while `values` is.
        unsafe {
            destination.copy_from_nonoverlapping(NonNull::from(values).cast::<T>(), values.len());
        }

        // Cannot overflow - bounded by capacity.
        self.len = self.len.wrapping_add(values.len());
    }

    /// Removes the last element.
    ///
    /// # Panics
    ///
    /// Panics if the vector is empty.
    pub fn pop_back(&mut self) {
        assert!(!self.is_empty(), "cannot pop from an empty vector");

        // Cannot underflow - we just checked that there is an element.
        self.len = self.len.wrapping_sub(1);
    }

    /// Removes the last element and returns a reference to the slot it occupied.
    ///
    /// The slot keeps the removed value until something else is pushed into it.
    ///
    /// # Panics
    ///
    /// Panics if the vector is empty.
    pub fn pop(&mut self) -> &T {
        self.pop_back();

        // SAFETY: `len < capacity` after popping, so the slot is in our range.
        let slot = unsafe { self.begin.add(self.len) };

        // SAFETY: The slot was initialized by the push that the pop reverted.
        unsafe { slot.as_ref() }
    }

    /// The last element.
    ///
    /// # Panics
    ///
    /// Panics if the vector is empty.
    #[must_use]
    pub fn back(&self) -> &T {
        self.as_slice()
            .last()
            .expect("cannot access the last element of an empty vector")
    }

    /// The last element, for modification.
    ///
    /// # Panics
    ///
    /// Panics if the vector is empty.
    #[must_use]
    pub fn back_mut(&mut self) -> &mut T {
        self.as_mut_slice()
            .last_mut()
            .expect("cannot access the last element of an empty vector")
    }

    /// Removes all elements. The memory stays with the vector.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// The elements of the vector.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: The first `len` slots are initialized and in our range.
        unsafe { slice::from_raw_parts(self.begin.as_ptr(), self.len) }
    }

    /// The elements of the vector, for modification.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: The first `len` slots are initialized and in our range. We hold the only
        // reference to the range.
        unsafe { slice::from_raw_parts_mut(self.begin.as_ptr(), self.len) }
    }

    /// Pointer to the slot at `index`, which may or may not hold an element.
    pub(crate) fn slot(&self, index: usize) -> NonNull<T> {
        assert!(index < self.capacity, "slot index out of bounds");

        // SAFETY: We just checked that the slot is in our range.
        unsafe { self.begin.add(index) }
    }

    /// Address of the first slot of the vector. Stays the same for the lifetime of the vector.
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        self.begin.as_ptr()
    }
}

impl<'a, T: Copy> BumpVec<'a, T> {
    /// Creates an empty vector over the free part of a leased arena, starting at the arena's bump
    /// pointer.
    ///
    /// The bump pointer is not moved, so the vector must not outlive the lease (this is enforced
    /// by the borrow checker).
    ///
    /// # Example
    ///
    /// ```
    /// use arena_stack::{ArenaPool, BumpVec};
    ///
    /// let pool = ArenaPool::builder().arena_size(1024 * 1024).build();
    /// let mut lease = pool.acquire();
    ///
    /// let mut items = BumpVec::<u16>::from_lease(&mut lease);
    /// items.push_back(7);
    ///
    /// assert_eq!(items.as_ptr().cast::<u8>(), lease.arena().bump().as_ptr());
    /// ```
    #[must_use]
    pub fn from_lease(lease: &'a mut ArenaLease<'_>) -> Self {
        Self::over_free_space(lease.arena(), Borrowed)
    }

    /// Creates an empty vector over the free part of `arena`, starting at its bump pointer.
    #[must_use]
    pub fn from_arena(arena: &'a mut Arena) -> Self {
        Self::over_free_space(arena, Borrowed)
    }

    /// Creates an empty vector over `capacity` slots starting at `begin`.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `begin` is aligned for `T` and that the `capacity` slots
    /// starting at `begin` are valid for reads and writes and not accessed by anything else for
    /// the lifetime `'a`.
    #[must_use]
    pub unsafe fn from_raw_parts(begin: NonNull<T>, capacity: usize) -> Self {
        Self::from_parts(begin, capacity, Borrowed)
    }
}

impl<T: Copy> BumpVec<'static, T, ArenaLease<'static>> {
    /// Creates an empty vector in an arena leased from the current thread's default pool.
    ///
    /// # Panics
    ///
    /// Panics if the pool cannot provide an arena.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(ArenaPool::current())
    }
}

impl<T: Copy> Default for BumpVec<'static, T, ArenaLease<'static>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'p, T: Copy> BumpVec<'p, T, ArenaLease<'p>> {
    /// Creates an empty vector in an arena leased from `pool`.
    ///
    /// # Panics
    ///
    /// Panics if the pool cannot provide an arena.
    #[must_use]
    pub fn new_in(pool: &'p ArenaPool) -> Self {
        Self::try_new_in(pool).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Creates an empty vector in an arena leased from `pool`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot provide an arena.
    pub fn try_new_in(pool: &'p ArenaPool) -> Result<Self> {
        let lease = pool.try_acquire()?;
        let arena = lease.leased_arena();

        Ok(Self::over_free_space(arena, lease))
    }

    /// The lease that keeps the vector's arena reserved for it.
    #[must_use]
    pub fn lease(&self) -> &ArenaLease<'p> {
        &self.backing
    }
}

impl<T: Copy> BumpVec<'static, T, Carve<'static>> {
    /// Creates an empty vector with room for `capacity` elements, carved from the current
    /// thread's default pool.
    ///
    /// # Panics
    ///
    /// Panics if the pool cannot provide an arena with enough room left.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_in(ArenaPool::current(), capacity)
    }
}

impl<'p, T: Copy> BumpVec<'p, T, Carve<'p>> {
    /// Creates an empty vector with room for `capacity` elements, carved from an arena of `pool`.
    ///
    /// # Panics
    ///
    /// Panics if the pool cannot provide an arena with enough room left.
    #[must_use]
    pub fn with_capacity_in(pool: &'p ArenaPool, capacity: usize) -> Self {
        Self::try_with_capacity_in(pool, capacity).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Creates an empty vector with room for `capacity` elements, carved from an arena of `pool`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot provide an arena or the arena does not have enough
    /// room left.
    pub fn try_with_capacity_in(pool: &'p ArenaPool, capacity: usize) -> Result<Self> {
        // Saturating is fine - no arena can fit that much, so carving fails with a clear error.
        let bytes = capacity.saturating_mul(size_of::<T>());

        let carve = pool.carve(bytes, align_of::<T>())?;
        let begin = carve.start().cast::<T>();

        Ok(Self::from_parts(begin, capacity, carve))
    }
}

impl<T: Copy, B> Deref for BumpVec<'_, T, B> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T: Copy, B> DerefMut for BumpVec<'_, T, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl<T: Copy, B> Extend<T> for BumpVec<'_, T, B> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push_back(value);
        }
    }
}

impl<T: Copy + fmt::Debug, B> fmt::Debug for BumpVec<'_, T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BumpVec")
            .field("items", &self.as_slice())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
