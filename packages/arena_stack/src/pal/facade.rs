#![cfg_attr(coverage_nightly, coverage(off))]

use std::fmt::Debug;
use std::io;
use std::ptr::NonNull;
#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
use crate::pal::MockPlatform;
use crate::pal::{BuildTargetPlatform, GrowthOptions, Platform};

/// Hides the real/mock platform choice behind a single type.
#[derive(Clone)]
pub(crate) enum PlatformFacade {
    Target(&'static BuildTargetPlatform),

    #[cfg(test)]
    Mock(Arc<MockPlatform>),
}

impl PlatformFacade {
    pub(crate) const fn target() -> Self {
        Self::Target(&BuildTargetPlatform)
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockPlatform) -> Self {
        Self::Mock(Arc::new(mock))
    }
}

impl Platform for PlatformFacade {
    fn reserve(&self, size: usize, growth: GrowthOptions) -> io::Result<NonNull<u8>> {
        match self {
            Self::Target(platform) => platform.reserve(size, growth),
            #[cfg(test)]
            Self::Mock(mock) => mock.reserve(size, growth),
        }
    }

    fn release(&self, base: NonNull<u8>, size: usize) {
        match self {
            Self::Target(platform) => platform.release(base, size),
            #[cfg(test)]
            Self::Mock(mock) => mock.release(base, size),
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
impl Debug for PlatformFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Target(inner) => inner.fmt(f),
            #[cfg(test)]
            Self::Mock(inner) => inner.fmt(f),
        }
    }
}
