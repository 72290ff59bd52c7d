use std::fmt;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{ArenaPool, ArenaVec};

/// Identifies the `NestedVecs` a key was issued by. Never reused within a process.
static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(0);

trait Sealed {}

/// Integer type used to store the length of each sequence in a [`NestedVecs`].
///
/// Smaller types save space when sequences are short. Implemented for `u8`, `u16`, `u32`, `u64`
/// and `usize`.
#[expect(private_bounds, reason = "sealed trait - the set of prefix types is closed")]
pub trait SizePrefix: Copy + Sealed + 'static {
    #[doc(hidden)]
    fn from_len(len: usize) -> Option<Self>;

    #[doc(hidden)]
    fn to_len(self) -> usize;
}

macro_rules! impl_size_prefix {
    ($($t:ty),*) => {
        $(
            impl Sealed for $t {}

            impl SizePrefix for $t {
                fn from_len(len: usize) -> Option<Self> {
                    Self::try_from(len).ok()
                }

                #[cfg_attr(test, mutants::skip)] // Conversion is lossless for stored lengths.
                fn to_len(self) -> usize {
                    usize::try_from(self).expect("stored lengths were converted from usize")
                }
            }
        )*
    };
}

impl_size_prefix!(u8, u16, u32, u64, usize);

/// Many variable-length sequences of `T`, stored back to back in one flat range of a single
/// leased arena.
///
/// Each sequence is stored as its length (of type `S`) followed by its elements, without any
/// padding. Appending a sequence returns a [`NestedKey`] that gives access to it later, as a
/// [`NestedSlice`]. Sequences cannot be removed or modified once added.
///
/// Because nothing is aligned, elements are read by copying them out of storage. Use a small
/// `S` to save space when the sequences are known to be short.
///
/// # Example
///
/// ```
/// use arena_stack::{ArenaPool, NestedVecs};
///
/// let pool = ArenaPool::builder().arena_size(1024 * 1024).build();
/// let mut words = NestedVecs::<u8, u8>::new_in(&pool);
///
/// let hello = words.push_back(b"hello");
/// let world = words.push_back(b"world!");
///
/// assert_eq!(words.get(hello).as_bytes(), b"hello");
/// assert_eq!(words.get(world).len(), 6);
///
/// // Each word takes one byte of length plus its contents.
/// assert_eq!(words.byte_len(), 1 + 5 + 1 + 6);
/// ```
pub struct NestedVecs<'p, T, S = u32> {
    bytes: ArenaVec<'p, MaybeUninit<u8>>,

    /// Number of sequences.
    count: usize,

    owner: u64,

    _types: PhantomData<(T, S)>,
}

impl<T: Copy, S: SizePrefix> NestedVecs<'static, T, S> {
    /// Creates an empty collection in an arena leased from the current thread's default pool.
    ///
    /// # Panics
    ///
    /// Panics if the pool cannot provide an arena.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(ArenaPool::current())
    }
}

impl<T: Copy, S: SizePrefix> Default for NestedVecs<'static, T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'p, T: Copy, S: SizePrefix> NestedVecs<'p, T, S> {
    /// Creates an empty collection in an arena leased from `pool`.
    ///
    /// # Panics
    ///
    /// Panics if the pool cannot provide an arena.
    #[must_use]
    pub fn new_in(pool: &'p ArenaPool) -> Self {
        Self {
            bytes: ArenaVec::new_in(pool),
            count: 0,
            owner: NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed),
            _types: PhantomData,
        }
    }

    /// Appends a copy of `items` as a new sequence.
    ///
    /// # Panics
    ///
    /// Panics if the length of `items` does not fit in `S` or if the arena is full.
    pub fn push_back(&mut self, items: &[T]) -> NestedKey {
        let len = S::from_len(items.len()).unwrap_or_else(|| {
            panic!(
                "a sequence of {} elements is too long for a {}-byte length prefix",
                items.len(),
                size_of::<S>()
            )
        });

        let prefix = as_uninit_bytes(slice::from_ref(&len));
        let contents = as_uninit_bytes(items);

        let needed = prefix
            .len()
            .checked_add(contents.len())
            .expect("a sequence that exists in memory cannot exceed the address space");

        // Cannot underflow - `len <= capacity` is an invariant of the vector.
        let available = self.bytes.capacity().wrapping_sub(self.bytes.len());

        assert!(
            needed <= available,
            "cannot add a sequence of {needed} bytes to an arena with {available} bytes left"
        );

        let offset = self.bytes.len();

        // SAFETY: We just checked that both fit.
        unsafe {
            self.bytes.push_multiple_unchecked(prefix);
        }

        // SAFETY: We just checked that both fit.
        unsafe {
            self.bytes.push_multiple_unchecked(contents);
        }

        // Cannot overflow - every sequence takes at least one byte.
        self.count = self.count.wrapping_add(1);

        NestedKey {
            owner: self.owner,
            offset,
        }
    }

    /// The sequence identified by `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` was issued by a different collection.
    #[must_use]
    pub fn get(&self, key: NestedKey) -> NestedSlice<'_, T> {
        assert_eq!(
            key.owner, self.owner,
            "key was issued by a different collection"
        );

        self.read_at(key.offset).0
    }

    /// Iterates over all sequences in the order they were added.
    pub fn iter(&self) -> NestedIter<'_, 'p, T, S> {
        NestedIter {
            vecs: self,
            offset: 0,
        }
    }

    /// Number of sequences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether no sequences have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of bytes used to store all sequences, including their length prefixes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Reads the sequence stored at `offset`, returning it with the offset of the next one.
    fn read_at(&self, offset: usize) -> (NestedSlice<'_, T>, usize) {
        let contents_start = offset
            .checked_add(size_of::<S>())
            .expect("offsets of stored sequences are within the arena");

        let prefix = self
            .bytes
            .get(offset..contents_start)
            .expect("offset does not point to a stored sequence");

        // SAFETY: The prefix bytes were written from an `S` by `push_back()`. We do not know the
        // alignment, so we read it unaligned.
        let len = unsafe { prefix.as_ptr().cast::<S>().read_unaligned() }.to_len();

        let contents_end = len
            .checked_mul(size_of::<T>())
            .and_then(|bytes| bytes.checked_add(contents_start))
            .expect("stored sequences are within the arena");

        let contents = self
            .bytes
            .get(contents_start..contents_end)
            .expect("stored sequences are within the arena");

        let slice = NestedSlice {
            items: contents.as_ptr().cast::<T>(),
            len,
            _storage: PhantomData,
        };

        (slice, contents_end)
    }
}

impl<'v, 'p, T: Copy, S: SizePrefix> IntoIterator for &'v NestedVecs<'p, T, S> {
    type Item = NestedSlice<'v, T>;
    type IntoIter = NestedIter<'v, 'p, T, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Copy + fmt::Debug, S: SizePrefix> fmt::Debug for NestedVecs<'_, T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Views any initialized values as bytes, which may include uninitialized padding.
fn as_uninit_bytes<T: Copy>(values: &[T]) -> &[MaybeUninit<u8>] {
    // SAFETY: The range is valid for reads of `size_of_val(values)` bytes and any byte is a valid
    // `MaybeUninit<u8>`.
    unsafe { slice::from_raw_parts(values.as_ptr().cast::<MaybeUninit<u8>>(), size_of_val(values)) }
}

/// Identifies a sequence in the [`NestedVecs`] that returned it from
/// [`push_back()`][NestedVecs::push_back].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NestedKey {
    owner: u64,
    offset: usize,
}

/// A sequence stored in a [`NestedVecs`].
///
/// The elements are not aligned in storage, so they are returned by value instead of by reference.
pub struct NestedSlice<'v, T> {
    items: *const T,
    len: usize,

    _storage: PhantomData<&'v [T]>,
}

impl<'v, T: Copy> NestedSlice<'v, T> {
    /// Number of elements in the sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the sequence has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// A copy of the element at `index`, or `None` if out of bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        if index >= self.len {
            return None;
        }

        // SAFETY: The index is in bounds, so the (unaligned) element is within the storage we
        // borrow, which is initialized.
        Some(unsafe { self.items.add(index).read_unaligned() })
    }

    /// Iterates over copies of the elements.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = T> + use<'v, T> {
        let this = *self;

        (0..self.len).map(move |index| {
            this.get(index)
                .expect("indexes within the length are always in bounds")
        })
    }

    /// Copies the elements to a new `Vec`.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    /// Address of the first element. It may not be aligned for `T`.
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        self.items
    }
}

impl<'v> NestedSlice<'v, u8> {
    /// The sequence as a byte slice. Bytes have no alignment requirements, so they can be
    /// borrowed directly.
    #[must_use]
    pub fn as_bytes(&self) -> &'v [u8] {
        // SAFETY: The bytes are initialized and borrowed from the collection for `'v`.
        unsafe { slice::from_raw_parts(self.items, self.len) }
    }
}

impl<T> Clone for NestedSlice<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NestedSlice<'_, T> {}

impl<T: Copy + fmt::Debug> fmt::Debug for NestedSlice<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over the sequences of a [`NestedVecs`], returned by [`NestedVecs::iter()`].
pub struct NestedIter<'v, 'p, T, S> {
    vecs: &'v NestedVecs<'p, T, S>,
    offset: usize,
}

impl<'v, T: Copy, S: SizePrefix> Iterator for NestedIter<'v, '_, T, S> {
    type Item = NestedSlice<'v, T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.vecs.byte_len() {
            return None;
        }

        let (slice, next) = self.vecs.read_at(self.offset);
        self.offset = next;

        Some(slice)
    }
}

impl<T, S> fmt::Debug for NestedIter<'_, '_, T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedIter")
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_not_impl_any;

    use super::*;

    assert_not_impl_any!(NestedVecs<'static, u32>: Send, Sync);
    assert_not_impl_any!(NestedSlice<'static, u32>: Send, Sync);

    #[test]
    fn sequences_round_trip_in_order() {
        let pool = ArenaPool::with_mock_platform(4096, 2);
        let mut vecs = NestedVecs::<u32>::new_in(&pool);

        let a = vecs.push_back(&[1, 2, 3]);
        let b = vecs.push_back(&[]);
        let c = vecs.push_back(&[42]);

        assert_eq!(vecs.len(), 3);
        assert_eq!(vecs.get(a).to_vec(), vec![1, 2, 3]);
        assert!(vecs.get(b).is_empty());
        assert_eq!(vecs.get(c).get(0), Some(42));
        assert_eq!(vecs.get(c).get(1), None);

        let all: Vec<Vec<u32>> = vecs.iter().map(|s| s.to_vec()).collect();
        assert_eq!(all, vec![vec![1, 2, 3], vec![], vec![42]]);
    }

    #[test]
    fn storage_is_packed_without_padding() {
        let pool = ArenaPool::with_mock_platform(4096, 2);
        let mut vecs = NestedVecs::<u64, u8>::new_in(&pool);

        vecs.push_back(&[1, 2]);
        let second = vecs.push_back(&[u64::MAX]);

        assert_eq!(vecs.byte_len(), 1 + 16 + 1 + 8);

        // The second sequence starts at an odd offset, so its elements are unaligned.
        assert_eq!(vecs.get(second).as_ptr().addr() % 8, 2);
        assert_eq!(vecs.get(second).get(0), Some(u64::MAX));
    }

    #[test]
    fn byte_sequences_are_borrowed_directly() {
        let pool = ArenaPool::with_mock_platform(4096, 2);
        let mut vecs = NestedVecs::<u8, u16>::new_in(&pool);

        let key = vecs.push_back(b"arena");

        assert_eq!(vecs.get(key).as_bytes(), b"arena");
    }

    #[test]
    #[should_panic]
    fn sequence_too_long_for_prefix_panics() {
        let pool = ArenaPool::with_mock_platform(4096, 2);
        let mut vecs = NestedVecs::<u8, u8>::new_in(&pool);

        vecs.push_back(&[0; 256]);
    }

    #[test]
    fn sequence_at_prefix_limit_is_accepted() {
        let pool = ArenaPool::with_mock_platform(4096, 2);
        let mut vecs = NestedVecs::<u8, u8>::new_in(&pool);

        let key = vecs.push_back(&[7; 255]);

        assert_eq!(vecs.get(key).len(), 255);
    }

    #[test]
    #[should_panic]
    fn full_arena_panics_without_partial_write() {
        let pool = ArenaPool::with_mock_platform(64, 2);
        let mut vecs = NestedVecs::<u8, u32>::new_in(&pool);

        vecs.push_back(&[0; 61]);
    }

    #[test]
    #[should_panic]
    fn foreign_key_is_rejected() {
        let pool = ArenaPool::with_mock_platform(4096, 2);
        let mut first = NestedVecs::<u32>::new_in(&pool);
        let mut second = NestedVecs::<u32>::new_in(&pool);

        let key = first.push_back(&[1]);
        second.push_back(&[2]);

        _ = second.get(key);
    }

    #[test]
    fn iterating_empty_collection_yields_nothing() {
        let pool = ArenaPool::with_mock_platform(4096, 2);
        let vecs = NestedVecs::<u32>::new_in(&pool);

        assert!(vecs.is_empty());
        assert_eq!(vecs.iter().count(), 0);
    }

    #[test]
    fn slices_iterate_elements() {
        let pool = ArenaPool::with_mock_platform(4096, 2);
        let mut vecs = NestedVecs::<i16, usize>::new_in(&pool);

        let key = vecs.push_back(&[-1, 0, 1]);
        let slice = vecs.get(key);

        assert_eq!(slice.iter().len(), 3);
        assert_eq!(slice.iter().sum::<i16>(), 0);
        assert_eq!(format!("{slice:?}"), "[-1, 0, 1]");
    }
}
