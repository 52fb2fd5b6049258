//! Allocation ledger for leak diagnostics.
//!
//! A [`HeapTracker`] records every live allocation made through a tracked
//! [`Heap`]. Freed slots are zeroed in place and never compacted, so the
//! ledger only grows; it is meant for short test runs and `--mem-report`
//! diagnostics, not for long-running processes.
//!
//! Trackers are plain values handed to the heaps that report to them, so
//! independent programs (or tests) each get an isolated ledger.

use crate::{AllocResult, AllocStats, Allocator, SystemAllocator};
use parking_lot::Mutex;
use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One ledger slot. `address == 0` marks a freed slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct HeapEntry {
    /// Address of the allocation, or 0 once freed.
    pub address: usize,
    /// Size of the allocation in bytes.
    pub size: usize,
}

impl HeapEntry {
    /// Whether the slot still describes a live allocation.
    #[inline]
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.address != 0
    }
}

/// Outstanding allocations at the time of a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeakReport {
    /// Number of live allocations.
    pub count: usize,
    /// Total bytes held by them.
    pub bytes: usize,
}

impl LeakReport {
    /// Whether nothing is outstanding.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.count == 0
    }
}

impl std::fmt::Display for LeakReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "mem-report: {} allocation(s) not freed, {} bytes leaked",
            self.count, self.bytes
        )
    }
}

/// Errors reported by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerError {
    /// A free named an address the ledger holds no live entry for.
    UnknownAddress(usize),
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownAddress(addr) => {
                write!(f, "double free or foreign pointer: no live allocation at {addr:#x}")
            }
        }
    }
}

impl std::error::Error for LedgerError {}

#[derive(Debug, Default)]
struct Ledger {
    entries: Vec<HeapEntry>,
    stats: AllocStats,
}

/// Process-level allocation ledger.
#[derive(Debug, Default)]
pub struct HeapTracker {
    enabled: AtomicBool,
    ledger: Mutex<Ledger>,
}

impl HeapTracker {
    /// Create a tracker with tracking switched off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker with tracking already switched on.
    #[must_use]
    pub fn with_tracking() -> Self {
        let tracker = Self::new();
        tracker.enable();
        tracker
    }

    /// Start tracking with a fresh, empty ledger.
    pub fn enable(&self) {
        *self.ledger.lock() = Ledger::default();
        self.enabled.store(true, Ordering::Release);
        tracing::debug!("heap tracking enabled");
    }

    /// Stop tracking. Existing entries are kept as they are.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        tracing::debug!("heap tracking disabled");
    }

    /// Whether allocations are currently being recorded.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Record a new allocation.
    pub fn add(&self, address: usize, size: usize) {
        if !self.is_enabled() {
            return;
        }
        let mut ledger = self.ledger.lock();
        ledger.entries.push(HeapEntry { address, size });
        ledger.stats.record_alloc(size);
        tracing::trace!(address, size, "alloc");
    }

    /// Mark the allocation at `address` as freed.
    ///
    /// The first live entry with a matching address is zeroed in place.
    pub fn remove(&self, address: usize) -> Result<(), LedgerError> {
        if !self.is_enabled() || address == 0 {
            return Ok(());
        }
        let mut ledger = self.ledger.lock();
        let Some(entry) = ledger.entries.iter_mut().find(|e| e.address == address) else {
            return Err(LedgerError::UnknownAddress(address));
        };
        entry.address = 0;
        let size = entry.size;
        ledger.stats.record_dealloc(size);
        tracing::trace!(address, size, "free");
        Ok(())
    }

    /// Sum up every live entry. `None` when tracking is off.
    #[must_use]
    pub fn report(&self) -> Option<LeakReport> {
        if !self.is_enabled() {
            return None;
        }
        let ledger = self.ledger.lock();
        let report = ledger
            .entries
            .iter()
            .filter(|e| e.is_live())
            .fold(LeakReport::default(), |acc, e| LeakReport {
                count: acc.count + 1,
                bytes: acc.bytes + e.size,
            });
        Some(report)
    }

    /// Allocation statistics since tracking was last enabled.
    #[must_use]
    pub fn stats(&self) -> AllocStats {
        self.ledger.lock().stats
    }

    /// Number of ledger slots, live or freed.
    #[must_use]
    pub fn ledger_len(&self) -> usize {
        self.ledger.lock().entries.len()
    }
}

/// Allocation handle passed to everything that allocates.
///
/// `Heap::system()` draws straight from the system allocator. A tracked
/// heap additionally reports every allocation and free to its tracker;
/// cloning the handle shares the tracker.
#[derive(Debug, Clone, Default)]
pub struct Heap {
    tracker: Option<Arc<HeapTracker>>,
}

impl Heap {
    /// Untracked heap.
    #[must_use]
    pub const fn system() -> Self {
        Self { tracker: None }
    }

    /// Heap reporting to `tracker`.
    #[must_use]
    pub fn tracked(tracker: Arc<HeapTracker>) -> Self {
        Self {
            tracker: Some(tracker),
        }
    }

    /// The tracker this heap reports to, if any.
    #[must_use]
    pub fn tracker(&self) -> Option<&Arc<HeapTracker>> {
        self.tracker.as_ref()
    }

    fn record_free(&self, ptr: NonNull<u8>) {
        if let Some(tracker) = &self.tracker {
            if let Err(err) = tracker.remove(ptr.as_ptr() as usize) {
                crate::fatal!("heap ledger: ", err.to_string());
            }
        }
    }
}

impl Allocator for Heap {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        let ptr = unsafe { SystemAllocator.allocate(layout)? };
        if let Some(tracker) = &self.tracker {
            tracker.add(ptr.as_ptr() as usize, layout.size());
        }
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.record_free(ptr);
        unsafe { SystemAllocator.deallocate(ptr, layout) };
    }

    unsafe fn allocate_zeroed(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        let ptr = unsafe { SystemAllocator.allocate_zeroed(layout)? };
        if let Some(tracker) = &self.tracker {
            tracker.add(ptr.as_ptr() as usize, layout.size());
        }
        Ok(ptr)
    }
}
