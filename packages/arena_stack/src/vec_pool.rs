use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::ptr::NonNull;

use crate::{ArenaPool, ArenaVec};

/// A vector whose slots can be handed back for reuse without ever invalidating their addresses.
///
/// [`alloc()`][1] fills a slot and returns a [`Slot`] handle to it. Slots handed back with
/// [`reuseable()`][2] go on a free list and are filled again by later allocations before the
/// vector grows. A freed slot is never removed from the vector, so its address stays valid and
/// it keeps its old value until it is reused.
///
/// The items and the free list each live in their own leased arena, so creating a `VecPool`
/// takes two nesting levels of the pool.
///
/// # Example
///
/// ```
/// use arena_stack::{ArenaPool, VecPool};
///
/// let pool = ArenaPool::builder().arena_size(1024 * 1024).build();
/// let mut particles = VecPool::<(f32, f32)>::new_in(&pool);
///
/// let a = particles.alloc((0.0, 0.0));
/// let b = particles.alloc((1.0, 1.0));
///
/// particles.reuseable(a);
///
/// // The freed slot is filled first.
/// let c = particles.alloc((2.0, 2.0));
/// assert_eq!(a, c);
///
/// assert_eq!(*particles.get(b), (1.0, 1.0));
/// assert_eq!(*particles.get(c), (2.0, 2.0));
/// ```
///
/// [1]: Self::alloc
/// [2]: Self::reuseable
pub struct VecPool<'p, T> {
    // Declared before `items` so that its lease, acquired after the one of `items`,
    // is released first.
    free_list: ArenaVec<'p, NonNull<T>>,

    items: ArenaVec<'p, T>,
}

impl<T: Copy> VecPool<'static, T> {
    /// Creates an empty vector in arenas leased from the current thread's default pool.
    ///
    /// # Panics
    ///
    /// Panics if the pool cannot provide two arenas.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(ArenaPool::current())
    }
}

impl<T: Copy> Default for VecPool<'static, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'p, T: Copy> VecPool<'p, T> {
    /// Creates an empty vector in arenas leased from `pool`.
    ///
    /// # Panics
    ///
    /// Panics if the pool cannot provide two arenas.
    #[must_use]
    pub fn new_in(pool: &'p ArenaPool) -> Self {
        let items = ArenaVec::new_in(pool);
        let free_list = ArenaVec::new_in(pool);

        Self { free_list, items }
    }

    /// Stores `value` in a free slot if there is one, otherwise in a new slot at the end.
    ///
    /// # Panics
    ///
    /// Panics if there is no free slot and the vector is at its capacity.
    pub fn alloc(&mut self, value: T) -> Slot<T> {
        let Some(&ptr) = self.free_list.last() else {
            self.items.push_back(value);

            // Cannot underflow - we just pushed an element.
            return Slot::new(self.items.slot(self.items.len().wrapping_sub(1)));
        };

        self.free_list.pop_back();

        let slot = Slot::new(ptr);
        *self.get_mut(slot) = value;

        slot
    }

    /// Hands a slot back for reuse by a future [`alloc()`][1].
    ///
    /// The slot keeps its current value until it is reused and its address stays valid.
    /// Handing back the same slot twice makes two future allocations share it.
    ///
    /// # Panics
    ///
    /// Panics if the slot does not belong to this vector.
    ///
    /// [1]: Self::alloc
    pub fn reuseable(&mut self, slot: Slot<T>) {
        assert!(
            self.index_of(slot).is_some(),
            "slot {:?} is not in the occupied range of this vector",
            slot.ptr
        );

        self.free_list.push_back(slot.ptr);
    }

    /// The value in `slot`.
    ///
    /// # Panics
    ///
    /// Panics if the slot does not belong to this vector.
    #[must_use]
    pub fn get(&self, slot: Slot<T>) -> &T {
        self.index_of(slot)
            .and_then(|index| self.items.get(index))
            .expect("slot is not in the occupied range of this vector")
    }

    /// The value in `slot`, for modification.
    ///
    /// # Panics
    ///
    /// Panics if the slot does not belong to this vector.
    #[must_use]
    pub fn get_mut(&mut self, slot: Slot<T>) -> &mut T {
        self.index_of(slot)
            .and_then(|index| self.items.get_mut(index))
            .expect("slot is not in the occupied range of this vector")
    }

    /// Appends `value` in a new slot at the end, ignoring the free list.
    ///
    /// # Panics
    ///
    /// Panics if the vector is at its capacity.
    pub fn push_back(&mut self, value: T) {
        self.items.push_back(value);
    }

    /// Number of slots waiting on the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    fn index_of(&self, slot: Slot<T>) -> Option<usize> {
        let offset = slot
            .ptr
            .addr()
            .get()
            .checked_sub(self.items.as_ptr().addr())?;

        if offset.checked_rem(size_of::<T>()) != Some(0) {
            return None;
        }

        offset
            .checked_div(size_of::<T>())
            .filter(|index| *index < self.items.len())
    }
}

impl<T: Copy> Deref for VecPool<'_, T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for VecPool<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VecPool")
            .field("items", &self.items.as_slice())
            .field("free_count", &self.free_list.len())
            .finish()
    }
}

/// Handle to a slot of a [`VecPool`], returned by [`VecPool::alloc()`].
///
/// A handle is just the address of the slot, which stays the same for as long as the vector
/// exists. Handles are freely copyable and two handles are equal if they refer to the same slot.
pub struct Slot<T> {
    ptr: NonNull<T>,
}

impl<T> Slot<T> {
    fn new(ptr: NonNull<T>) -> Self {
        Self { ptr }
    }

    /// Address of the slot.
    ///
    /// Dereferencing the pointer is only valid while the vector is alive and, for writes, while
    /// no reference to the vector's contents exists.
    #[must_use]
    pub fn as_ptr(self) -> *const T {
        self.ptr.as_ptr()
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Slot<T> {}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T> Eq for Slot<T> {}

impl<T> Hash for Slot<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr.hash(state);
    }
}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Slot").field(&self.ptr).finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::ptr;

    use static_assertions::assert_not_impl_any;

    use super::*;

    assert_not_impl_any!(VecPool<'static, u32>: Send, Sync);
    assert_not_impl_any!(Slot<u32>: Send, Sync);

    #[test]
    fn freed_slot_is_reused_first() {
        let pool = ArenaPool::with_mock_platform(4096, 4);
        let mut values = VecPool::<u32>::new_in(&pool);

        let first = values.alloc(1);
        let second = values.alloc(2);
        let third = values.alloc(3);

        values.reuseable(second);
        assert_eq!(values.free_count(), 1);

        // The freed slot keeps its value until reused.
        assert_eq!(*values.get(second), 2);

        let fourth = values.alloc(4);

        assert_eq!(fourth, second);
        assert_eq!(values.free_count(), 0);
        assert_eq!(*values.get(first), 1);
        assert_eq!(*values.get(fourth), 4);
        assert_eq!(*values.get(third), 3);
        assert_eq!(&*values, &[1, 4, 3]);
    }

    #[test]
    fn slot_addresses_are_stable() {
        let pool = ArenaPool::with_mock_platform(64 * 1024, 4);
        let mut values = VecPool::<u64>::new_in(&pool);

        let slot = values.alloc(7);
        let address = slot.as_ptr();

        for i in 0..1000 {
            values.alloc(i);
        }

        assert_eq!(values.get(slot), &7);
        assert!(ptr::eq(values.get(slot), address));
        assert!(ptr::eq(&values[0], address));
    }

    #[test]
    fn free_list_is_last_in_first_out() {
        let pool = ArenaPool::with_mock_platform(4096, 4);
        let mut values = VecPool::<u8>::new_in(&pool);

        let a = values.alloc(1);
        let b = values.alloc(2);

        values.reuseable(a);
        values.reuseable(b);

        assert_eq!(values.alloc(3), b);
        assert_eq!(values.alloc(4), a);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn push_back_ignores_free_list() {
        let pool = ArenaPool::with_mock_platform(4096, 4);
        let mut values = VecPool::<u16>::new_in(&pool);

        let a = values.alloc(1);
        values.reuseable(a);
        values.push_back(2);

        assert_eq!(values.free_count(), 1);
        assert_eq!(&*values, &[1, 2]);

        *values.get_mut(a) = 5;
        assert_eq!(&*values, &[5, 2]);
    }

    #[test]
    fn releases_both_leases() {
        let pool = ArenaPool::with_mock_platform(4096, 4);

        {
            let mut values = VecPool::<u32>::new_in(&pool);
            values.alloc(1);

            assert_eq!(pool.locked(), 2);
        }

        assert_eq!(pool.locked(), 0);
    }

    #[test]
    #[should_panic]
    fn foreign_slot_is_rejected() {
        let pool = ArenaPool::with_mock_platform(4096, 4);
        let mut left = VecPool::<u32>::new_in(&pool);
        let mut right = VecPool::<u32>::new_in(&pool);

        let slot = left.alloc(1);
        right.alloc(2);

        right.reuseable(slot);
    }

    #[test]
    #[should_panic]
    fn slot_beyond_occupied_range_is_rejected() {
        let pool = ArenaPool::with_mock_platform(4096, 4);
        let mut values = VecPool::<u32>::new_in(&pool);

        let slot = values.alloc(1);
        values.items.pop_back();

        _ = values.get(slot);
    }
}
