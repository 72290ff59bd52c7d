use windows::Win32::Foundation::{STATUS_ACCESS_VIOLATION, STATUS_GUARD_PAGE_VIOLATION};
use windows::Win32::System::Diagnostics::Debug::EXCEPTION_POINTERS;

use crate::pal::windows::{RESERVATIONS, TrackedRange, commit_batch, page_size};

// Return values of a vectored exception handler.
const EXCEPTION_CONTINUE_EXECUTION: i32 = -1;
const EXCEPTION_CONTINUE_SEARCH: i32 = 0;

/// What kind of fault the OS reported.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum FaultKind {
    /// Access to a reserved but uncommitted page.
    AccessViolation,

    /// Access to a `PAGE_GUARD` page. The OS has already removed the guard flag by the time
    /// we see this.
    GuardPage,
}

/// Decides where to start committing in response to a fault at `address` inside `range`.
///
/// Returns `None` if the fault is not one we service, in which case it must be passed on to
/// the next handler.
pub(super) fn commit_start_for_fault(
    range: &TrackedRange,
    address: usize,
    kind: FaultKind,
    page_size: usize,
) -> Option<usize> {
    if !range.contains(address) {
        return None;
    }

    let page_start = address & !(page_size.wrapping_sub(1));

    match (kind, range.guarded) {
        // The guard page itself is now committed, so growth continues after it.
        (FaultKind::GuardPage, true) => page_start.checked_add(page_size),
        (FaultKind::AccessViolation, false) => Some(page_start),
        // A guarded range never commits at random offsets and an unguarded range has no guard
        // pages of ours - whatever this is, it belongs to someone else.
        (FaultKind::GuardPage, false) | (FaultKind::AccessViolation, true) => None,
    }
}

/// Process-wide vectored exception handler that grows the committed part of our reservations.
///
/// Faults outside every live reservation, and faults that do not match the reservation's growth
/// policy, continue down the handler chain untouched.
pub(super) unsafe extern "system" fn commit_on_fault(info: *mut EXCEPTION_POINTERS) -> i32 {
    // SAFETY: The OS passes either null or a pointer that is valid for the duration of the call.
    let Some(info) = (unsafe { info.as_ref() }) else {
        return EXCEPTION_CONTINUE_SEARCH;
    };

    // SAFETY: Same as above, the record is owned by the OS for the duration of the call.
    let Some(record) = (unsafe { info.ExceptionRecord.as_ref() }) else {
        return EXCEPTION_CONTINUE_SEARCH;
    };

    let kind = if record.ExceptionCode == STATUS_ACCESS_VIOLATION {
        FaultKind::AccessViolation
    } else if record.ExceptionCode == STATUS_GUARD_PAGE_VIOLATION {
        FaultKind::GuardPage
    } else {
        return EXCEPTION_CONTINUE_SEARCH;
    };

    // For both exception codes, the second parameter is the virtual address that was accessed.
    let Some(&address) = record.ExceptionInformation.get(1) else {
        return EXCEPTION_CONTINUE_SEARCH;
    };

    let Some(range) = RESERVATIONS.find(address) else {
        return EXCEPTION_CONTINUE_SEARCH;
    };

    let Some(commit_start) = commit_start_for_fault(&range, address, kind, page_size()) else {
        return EXCEPTION_CONTINUE_SEARCH;
    };

    // If committing fails (e.g. the system commit limit is reached), the fault is turned back
    // into a regular exception.
    if commit_batch(&range, commit_start) {
        EXCEPTION_CONTINUE_EXECUTION
    } else {
        EXCEPTION_CONTINUE_SEARCH
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    const PAGE: usize = 4096;

    fn range(guarded: bool) -> TrackedRange {
        TrackedRange {
            base: 0x100_0000,
            size: 0x10_0000,
            batch_bytes: 256 * PAGE,
            guarded,
        }
    }

    #[test]
    fn random_access_commits_at_faulting_page() {
        let range = range(false);

        assert_eq!(
            commit_start_for_fault(&range, 0x105_4321, FaultKind::AccessViolation, PAGE),
            Some(0x105_4000)
        );
    }

    #[test]
    fn guarded_growth_commits_after_guard_page() {
        let range = range(true);

        assert_eq!(
            commit_start_for_fault(&range, 0x101_0010, FaultKind::GuardPage, PAGE),
            Some(0x101_1000)
        );
    }

    #[test]
    fn foreign_faults_are_not_serviced() {
        let unguarded = range(false);
        let guarded = range(true);

        // Outside the range.
        assert_eq!(
            commit_start_for_fault(&unguarded, 0x200_0000, FaultKind::AccessViolation, PAGE),
            None
        );

        // Policy mismatch.
        assert_eq!(
            commit_start_for_fault(&unguarded, 0x101_0000, FaultKind::GuardPage, PAGE),
            None
        );
        assert_eq!(
            commit_start_for_fault(&guarded, 0x101_0000, FaultKind::AccessViolation, PAGE),
            None
        );
    }
}
