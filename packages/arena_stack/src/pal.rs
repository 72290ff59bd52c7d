//! Platform Abstraction Layer (PAL). Private API that hides how each operating system hands out
//! large ranges of address space and how those ranges become backed by physical memory.

mod abstractions;
pub(crate) use abstractions::*;

mod facade;
pub(crate) use facade::*;

#[cfg(test)]
mod mocks;
#[cfg(test)]
pub(crate) use mocks::*;

#[cfg(all(any(target_os = "linux", target_os = "macos"), not(miri)))]
mod unix;
#[cfg(all(any(target_os = "linux", target_os = "macos"), not(miri)))]
pub(crate) use unix::*;

#[cfg(all(windows, not(miri)))]
mod windows;
#[cfg(all(windows, not(miri)))]
pub(crate) use windows::*;

// The fallback module is compiled in test mode on all platforms, under Miri, and as the primary
// implementation on unsupported platforms. We only glob-import it when it is the primary
// implementation. In test mode on supported platforms, tests reach it via `fallback::`.
#[cfg(any(test, miri, not(any(target_os = "linux", target_os = "macos", windows))))]
pub(crate) mod fallback;

#[cfg(any(miri, not(any(target_os = "linux", target_os = "macos", windows))))]
pub(crate) use fallback::*;
