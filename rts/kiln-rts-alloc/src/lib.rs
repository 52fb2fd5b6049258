//! Memory allocation primitives for the Kiln runtime.
//!
//! Every byte a compiled Kiln program owns is allocated through this crate.
//! It provides:
//!
//! - the [`Allocator`] trait and the [`SystemAllocator`] backing it,
//! - the [`Heap`] handle that routes allocations to an optional
//!   [`HeapTracker`] for leak reports,
//! - [`Region`] (owned memory) and [`RegionView`] (borrowed sub-views),
//!   carrying element-shape metadata for the containers built on top,
//! - the process-fatal panic primitive in [`fatal`].
//!
//! # Ownership
//!
//! A [`Region`] is the only handle that can free memory, and it does so
//! exactly once: on [`Region::delete`] or when dropped. Pointer arithmetic
//! always produces a [`RegionView`], which borrows from its source and can
//! never release anything.

#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod fatal;
pub mod region;
pub mod tracker;

pub use region::{ElemShape, Region, RegionView, TypeTag};
pub use tracker::{Heap, HeapEntry, HeapTracker, LeakReport, LedgerError};

use std::alloc::{Layout, LayoutError};
use std::ptr::NonNull;

/// Result type for allocation operations.
pub type AllocResult<T> = Result<T, AllocError>;

/// Errors that can occur during allocation or raw region access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// The system allocator returned null.
    OutOfMemory {
        /// Requested allocation size.
        requested: usize,
    },
    /// A region of zero bytes was requested.
    ZeroSized,
    /// Invalid layout (size overflow or bad alignment).
    InvalidLayout(String),
    /// A byte range fell outside the region it addressed.
    OutOfBounds {
        /// Start of the requested range.
        offset: usize,
        /// Length of the requested range.
        len: usize,
        /// Size of the region.
        size: usize,
    },
}

impl std::fmt::Display for AllocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfMemory { requested } => {
                write!(f, "out of memory: failed to allocate {requested} bytes")
            }
            Self::ZeroSized => write!(f, "cannot allocate a region of 0 bytes"),
            Self::InvalidLayout(msg) => write!(f, "invalid layout: {msg}"),
            Self::OutOfBounds { offset, len, size } => {
                write!(
                    f,
                    "byte range {offset}..{} is outside a region of {size} bytes",
                    offset.saturating_add(*len)
                )
            }
        }
    }
}

impl std::error::Error for AllocError {}

impl From<LayoutError> for AllocError {
    fn from(e: LayoutError) -> Self {
        Self::InvalidLayout(e.to_string())
    }
}

/// Trait for memory allocators in the runtime.
pub trait Allocator {
    /// Allocate a block of memory with the given layout.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    /// - The returned pointer is released with `deallocate` and the same layout
    /// - The memory is not accessed after deallocation
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>>;

    /// Deallocate a previously allocated block.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    /// - `ptr` was allocated by this allocator with the same `layout`
    /// - `ptr` has not been deallocated before
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Allocate zeroed memory.
    ///
    /// # Safety
    ///
    /// Same requirements as `allocate`.
    unsafe fn allocate_zeroed(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        let ptr = unsafe { self.allocate(layout)? };
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0, layout.size());
        }
        Ok(ptr)
    }
}

impl<A: Allocator + ?Sized> Allocator for &A {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        unsafe { (**self).allocate(layout) }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { (**self).deallocate(ptr, layout) }
    }

    unsafe fn allocate_zeroed(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        unsafe { (**self).allocate_zeroed(layout) }
    }
}

/// Statistics for memory allocation tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocStats {
    /// Total bytes currently allocated.
    pub bytes_allocated: usize,
    /// Total number of allocations performed.
    pub allocation_count: usize,
    /// Total number of deallocations performed.
    pub deallocation_count: usize,
    /// Peak memory usage in bytes.
    pub peak_bytes: usize,
}

impl AllocStats {
    /// Create new empty statistics.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes_allocated: 0,
            allocation_count: 0,
            deallocation_count: 0,
            peak_bytes: 0,
        }
    }

    /// Record an allocation.
    pub fn record_alloc(&mut self, size: usize) {
        self.bytes_allocated += size;
        self.allocation_count += 1;
        self.peak_bytes = self.peak_bytes.max(self.bytes_allocated);
    }

    /// Record a deallocation.
    pub fn record_dealloc(&mut self, size: usize) {
        self.bytes_allocated = self.bytes_allocated.saturating_sub(size);
        self.deallocation_count += 1;
    }
}

/// The untracked allocator every [`Heap`] ultimately draws from.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        if layout.size() == 0 {
            return Err(AllocError::ZeroSized);
        }

        let ptr = unsafe { std::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError::OutOfMemory {
            requested: layout.size(),
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
    }

    unsafe fn allocate_zeroed(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        if layout.size() == 0 {
            return Err(AllocError::ZeroSized);
        }

        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        NonNull::new(ptr).ok_or(AllocError::OutOfMemory {
            requested: layout.size(),
        })
    }
}
