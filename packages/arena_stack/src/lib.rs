#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Growable vectors that never reallocate, backed by large reserved ranges of address space.
//!
//! Every container in this crate lives inside an [`Arena`] - a range of address space large
//! enough (64 GiB by default) that the container never has to move to grow. Physical memory is
//! supplied by the operating system only for the pages that are actually touched. This gives:
//!
//! - **Pointer stability**: the address of an element never changes while the element exists,
//!   no matter how much the container grows afterwards.
//! - **Cheap push and pop**: both are a bounds check plus a pointer bump.
//! - **Cheap setup**: arenas are reused through an [`ArenaPool`], so creating a container is a
//!   couple of counter updates once the pool is warm.
//!
//! # Containers
//!
//! - [`ArenaVec<T>`] leases a whole arena from the pool and can grow to fill it.
//! - [`CappedVec<T>`] carves a fixed capacity out of an arena and releases the arena right away,
//!   so that later containers can share it.
//! - [`FixedVec<T>`] is a read-only copy of a slice, carved the same way.
//! - [`VecPool<T>`] is a vector with a free list of reusable slots, whose addresses stay valid
//!   after the slot is freed.
//! - [`NestedVecs<T>`] stores many variable-length sequences back to back in one flat range.
//! - [`BumpVec<T>`] is the shared core. It can also be used directly as a view that starts at
//!   the bump pointer of an arena you hold.
//!
//! Elements must be [`Copy`] and are never dropped.
//!
//! # Nesting
//!
//! Arenas are leased from a pool like frames from a stack: the most recently leased arena must
//! be returned first. Containers held in local variables of nested scopes follow this rule
//! without any effort. Violating it panics.
//!
//! ```
//! use arena_stack::{ArenaPool, ArenaVec, CappedVec};
//!
//! let pool = ArenaPool::builder().arena_size(16 * 1024 * 1024).build();
//!
//! let mut squares = ArenaVec::<u64>::new_in(&pool);
//!
//! for i in 0..1000 {
//!     squares.push_back(i * i);
//! }
//!
//! let first: *const u64 = &squares[0];
//!
//! {
//!     let mut scratch = CappedVec::<u64>::with_capacity_in(&pool, 100);
//!     scratch.push_multiple(&squares[..100]);
//!
//!     assert_eq!(scratch.len(), 100);
//! }
//!
//! squares.push_back(1_000_000);
//!
//! // The vector never moved.
//! assert_eq!(first, &squares[0] as *const u64);
//! ```
//!
//! # Thread safety
//!
//! Everything in this crate is single-threaded. Each thread has its own default pool, returned
//! by [`ArenaPool::current()`], which is used by constructors that do not take a pool.

mod arena;
mod builder;
mod bump_vec;
mod carve;
mod error;
mod fixed_vec;
mod growth_policy;
mod lease;
mod nested;
mod pal;
mod pool;
mod vec_pool;

pub use arena::*;
pub use builder::*;
pub use bump_vec::*;
pub use carve::*;
pub use error::*;
pub use fixed_vec::*;
pub use growth_policy::*;
pub use lease::*;
pub use nested::*;
pub use pool::*;
pub use vec_pool::*;
