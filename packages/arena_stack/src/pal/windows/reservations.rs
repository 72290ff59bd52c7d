use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

/// Upper bound on simultaneously live reservations across all threads of the process.
///
/// Each pool on each thread may materialize up to its configured number of arenas, so this is set
/// well above the default per-pool limit.
pub(super) const MAX_TRACKED_RESERVATIONS: usize = 4096;

/// Every live arena reservation in the process, consulted by the page fault handler to decide
/// whether a fault belongs to us.
pub(super) static RESERVATIONS: Reservations<MAX_TRACKED_RESERVATIONS> = Reservations::new();

const VACANT: u8 = 0;
const CLAIMED: u8 = 1;
const LIVE: u8 = 2;

/// A reservation as seen by the page fault handler.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) struct TrackedRange {
    pub(super) base: usize,
    pub(super) size: usize,

    /// How many bytes to commit per serviced fault.
    pub(super) batch_bytes: usize,

    /// Whether the range grows via guard pages (sequential access only) instead of
    /// committing wherever an access violation lands.
    pub(super) guarded: bool,
}

impl TrackedRange {
    pub(super) fn contains(&self, address: usize) -> bool {
        address >= self.base && address.wrapping_sub(self.base) < self.size
    }

    /// One past the last byte of the range.
    pub(super) fn end(&self) -> usize {
        // Cannot overflow - the OS gave us this range, so it fits in the address space.
        self.base.wrapping_add(self.size)
    }
}

/// One slot of the registry. Fields other than `state` are only meaningful while `state` is
/// `LIVE` and are published by the release-store that makes it `LIVE`.
#[derive(Debug)]
struct Entry {
    state: AtomicU8,
    base: AtomicUsize,
    size: AtomicUsize,
    batch_bytes: AtomicUsize,
    guarded: AtomicBool,
}

impl Entry {
    const fn vacant() -> Self {
        Self {
            state: AtomicU8::new(VACANT),
            base: AtomicUsize::new(0),
            size: AtomicUsize::new(0),
            batch_bytes: AtomicUsize::new(0),
            guarded: AtomicBool::new(false),
        }
    }

    fn load(&self) -> Option<TrackedRange> {
        if self.state.load(Ordering::Acquire) != LIVE {
            return None;
        }

        Some(TrackedRange {
            base: self.base.load(Ordering::Relaxed),
            size: self.size.load(Ordering::Relaxed),
            batch_bytes: self.batch_bytes.load(Ordering::Relaxed),
            guarded: self.guarded.load(Ordering::Relaxed),
        })
    }
}

/// Lock-free fixed-capacity registry of live reservations.
///
/// The page fault handler runs on whichever thread faulted, possibly while another thread is
/// registering or unregistering its own arenas, so the registry cannot take locks or allocate.
#[derive(Debug)]
pub(super) struct Reservations<const CAPACITY: usize> {
    entries: [Entry; CAPACITY],
}

impl<const CAPACITY: usize> Reservations<CAPACITY> {
    pub(super) const fn new() -> Self {
        Self {
            entries: [const { Entry::vacant() }; CAPACITY],
        }
    }

    /// Starts tracking a range. Returns `false` if the registry is full.
    pub(super) fn register(&self, range: TrackedRange) -> bool {
        for entry in &self.entries {
            if entry
                .state
                .compare_exchange(VACANT, CLAIMED, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }

            entry.base.store(range.base, Ordering::Relaxed);
            entry.size.store(range.size, Ordering::Relaxed);
            entry.batch_bytes.store(range.batch_bytes, Ordering::Relaxed);
            entry.guarded.store(range.guarded, Ordering::Relaxed);

            // Release pairs with the Acquire in `Entry::load()`, publishing the fields above.
            entry.state.store(LIVE, Ordering::Release);
            return true;
        }

        false
    }

    /// Stops tracking the range that starts at `base`. No-op if no such range is tracked.
    pub(super) fn unregister(&self, base: usize) {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.load().is_some_and(|range| range.base == base));

        if let Some(entry) = entry {
            entry.state.store(VACANT, Ordering::Release);
        }
    }

    /// Finds the live range that contains `address`, if any.
    pub(super) fn find(&self, address: usize) -> Option<TrackedRange> {
        self.entries
            .iter()
            .filter_map(Entry::load)
            .find(|range| range.contains(address))
    }
}
