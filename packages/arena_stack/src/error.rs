use std::io;

use thiserror::Error;

/// Errors that can occur when obtaining arena memory.
///
/// The infallible entry points of this crate (e.g. [`ArenaPool::acquire()`][1] or the container
/// constructors) treat all of these as fatal and panic with the error message. The `try_`
/// variants return them to the caller instead.
///
/// [1]: crate::ArenaPool::acquire
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArenaError {
    /// The operating system refused to reserve the requested amount of address space.
    #[error("failed to reserve {size} bytes of address space for an arena")]
    ReservationFailed {
        /// Number of bytes that were requested.
        size: usize,

        /// The error reported by the operating system.
        #[source]
        source: io::Error,
    },

    /// Every arena the pool is allowed to materialize is already leased.
    ///
    /// This indicates that arenas are not being acquired in a scope-nested pattern.
    #[error(
        "all {max_arenas} arenas in the pool are leased - arenas must be acquired and released in nested scopes"
    )]
    PoolExhausted {
        /// The configured maximum number of arenas in the pool.
        max_arenas: usize,
    },

    /// A fixed-size range was requested from an arena that does not have that much left.
    #[error("arena has {remaining} bytes left but {requested} bytes were requested")]
    ArenaFull {
        /// Number of bytes that were requested, including any alignment padding.
        requested: usize,

        /// Number of bytes that were still free in the arena.
        remaining: usize,
    },
}

/// A specialized `Result` type for arena operations, returning the crate's
/// [`ArenaError`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, ArenaError>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::error::Error as _;
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(ArenaError: Send, Sync, Debug);

    #[test]
    fn reservation_failure_exposes_os_error() {
        let error = ArenaError::ReservationFailed {
            size: 4096,
            source: io::Error::from(io::ErrorKind::OutOfMemory),
        };

        assert!(error.to_string().contains("4096"));
        assert!(error.source().is_some());
    }

    #[test]
    fn exhaustion_message_names_limit() {
        let error = ArenaError::PoolExhausted { max_arenas: 7 };

        assert!(error.to_string().contains("all 7 arenas"));
    }
}
