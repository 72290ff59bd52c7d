mod fault;
mod reservations;

use std::ffi::c_void;
use std::io;
use std::ptr::{self, NonNull};
use std::sync::OnceLock;

use fault::*;
use reservations::*;
use tracing::{debug, warn};
use windows::Win32::System::Diagnostics::Debug::AddVectoredExceptionHandler;
use windows::Win32::System::Memory::{
    MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_GUARD, PAGE_READWRITE, VirtualAlloc, VirtualFree,
};
use windows::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

use crate::GrowthPolicy;
use crate::pal::{GrowthOptions, Platform};

/// Platform that targets the operating system the build is targeting.
///
/// Windows does not overcommit: reserved pages must be explicitly committed before first access.
/// To preserve the "write anywhere in the reservation" contract of the PAL, we commit the first
/// batch of pages eagerly and install a vectored exception handler that commits the next batch
/// whenever an access faults inside one of our live reservations.
#[derive(Debug, Default)]
pub(crate) struct BuildTargetPlatform;

#[cfg_attr(coverage_nightly, coverage(off))]
impl Platform for BuildTargetPlatform {
    fn reserve(&self, size: usize, growth: GrowthOptions) -> io::Result<NonNull<u8>> {
        ensure_fault_handler_installed()?;

        let batch_bytes = page_size()
            .checked_mul(growth.commit_batch_pages.get())
            .ok_or_else(|| io::Error::other("commit batch size overflows the address space"))?;

        // SAFETY: Reserving without an address hint has no safety requirements.
        let base = unsafe { VirtualAlloc(None, size, MEM_RESERVE, PAGE_READWRITE) };
        let base = NonNull::new(base.cast::<u8>()).ok_or_else(io::Error::last_os_error)?;

        let range = TrackedRange {
            base: base.addr().get(),
            size,
            batch_bytes,
            guarded: growth.policy == GrowthPolicy::SequentialGuard,
        };

        if !RESERVATIONS.register(range) {
            free(base);
            return Err(io::Error::other(
                "too many live arena reservations in the process",
            ));
        }

        if !commit_batch(&range, range.base) {
            let error = io::Error::last_os_error();
            RESERVATIONS.unregister(range.base);
            free(base);
            return Err(error);
        }

        debug!(size, base = ?base, batch_bytes, policy = ?growth.policy, "reserved address space");

        Ok(base)
    }

    fn release(&self, base: NonNull<u8>, size: usize) {
        // Unregister first so the fault handler never commits into a range we are releasing.
        RESERVATIONS.unregister(base.addr().get());
        free(base);

        debug!(size, base = ?base, "released address space");
    }
}

fn free(base: NonNull<u8>) {
    // SAFETY: The caller guarantees `base` is the start of a reservation we made and that
    // nothing will access it after this call. Size must be 0 when releasing.
    if let Err(error) = unsafe { VirtualFree(base.as_ptr().cast(), 0, MEM_RELEASE) } {
        warn!(base = ?base, %error, "failed to release address space");
    }
}

/// Commits the batch of pages starting at `page_start` (clamped to the end of the range) and,
/// for guarded ranges, installs a guard page right after the batch.
///
/// Called from the page fault handler, so must not allocate or take locks.
fn commit_batch(range: &TrackedRange, page_start: usize) -> bool {
    let end = range.end();

    if page_start >= end {
        return false;
    }

    let batch_end = page_start.saturating_add(range.batch_bytes).min(end);

    // SAFETY: The pages are inside a live reservation of ours. Committing already committed
    // pages is harmless.
    let committed = unsafe {
        VirtualAlloc(
            Some(ptr::without_provenance::<c_void>(page_start)),
            batch_end.wrapping_sub(page_start),
            MEM_COMMIT,
            PAGE_READWRITE,
        )
    };

    if committed.is_null() {
        return false;
    }

    if !range.guarded || batch_end >= end {
        return true;
    }

    let guard_size = page_size().min(end.wrapping_sub(batch_end));

    // SAFETY: The guard page is inside a live reservation of ours, right after the batch.
    let guard = unsafe {
        VirtualAlloc(
            Some(ptr::without_provenance::<c_void>(batch_end)),
            guard_size,
            MEM_COMMIT,
            PAGE_READWRITE | PAGE_GUARD,
        )
    };

    !guard.is_null()
}

fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

    *PAGE_SIZE.get_or_init(|| {
        let mut info = SYSTEM_INFO::default();

        // SAFETY: No safety requirements beyond passing a valid output pointer.
        unsafe {
            GetSystemInfo(&raw mut info);
        }

        usize::try_from(info.dwPageSize).expect("page size always fits in usize")
    })
}

fn ensure_fault_handler_installed() -> io::Result<()> {
    static INSTALLED: OnceLock<bool> = OnceLock::new();

    let installed = *INSTALLED.get_or_init(|| {
        // We ask to be first in the chain because a guard page violation is a one-shot event -
        // if an earlier handler swallowed it, our guard page would be gone for good.
        // SAFETY: The handler is a plain function that stays valid for the process lifetime.
        let handle = unsafe { AddVectoredExceptionHandler(1, Some(commit_on_fault)) };

        debug!(installed = !handle.is_null(), "installed arena page fault handler");

        !handle.is_null()
    });

    if installed {
        Ok(())
    } else {
        Err(io::Error::other(
            "failed to install the arena page fault handler",
        ))
    }
}
