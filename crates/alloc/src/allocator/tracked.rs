//! Tracked allocator implementation
//!
//! Wraps another allocator and counts what passes through it. Installed as
//! the process-global default when `AllocatorConfig::track_allocations` is
//! set, and used throughout the test suite to check that every block handed
//! out is handed back.
//!
//! # Safety
//!
//! - All unsafe operations are forwarded to the inner allocator unchanged
//! - Counters are atomics, so tracking adds no `Sync` requirement of its own
//!
//! ## Invariants
//!
//! - Every successful allocation is counted exactly once
//! - Failed allocations only bump the failure counter
//! - Reallocation counts as one deallocation plus one allocation

use core::alloc::Layout;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::{AllocResult, Allocator};

/// Point-in-time copy of a [`TrackedAllocator`]'s counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationStats {
    pub allocated_bytes: usize,
    pub peak_allocated_bytes: usize,
    pub allocation_count: usize,
    pub deallocation_count: usize,
    pub failed_allocations: usize,
}

#[derive(Debug)]
struct AtomicStats {
    allocated_bytes: AtomicUsize,
    peak_allocated_bytes: AtomicUsize,
    allocation_count: AtomicUsize,
    deallocation_count: AtomicUsize,
    failed_allocations: AtomicUsize,
}

impl AtomicStats {
    const fn new() -> Self {
        Self {
            allocated_bytes: AtomicUsize::new(0),
            peak_allocated_bytes: AtomicUsize::new(0),
            allocation_count: AtomicUsize::new(0),
            deallocation_count: AtomicUsize::new(0),
            failed_allocations: AtomicUsize::new(0),
        }
    }

    fn record_allocation(&self, size: usize) {
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
        let current = self.allocated_bytes.fetch_add(size, Ordering::Relaxed) + size;
        self.peak_allocated_bytes.fetch_max(current, Ordering::Relaxed);
    }

    fn record_deallocation(&self, size: usize) {
        self.deallocation_count.fetch_add(1, Ordering::Relaxed);
        self.allocated_bytes.fetch_sub(size, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed_allocations.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> AllocationStats {
        AllocationStats {
            allocated_bytes: self.allocated_bytes.load(Ordering::Relaxed),
            peak_allocated_bytes: self.peak_allocated_bytes.load(Ordering::Relaxed),
            allocation_count: self.allocation_count.load(Ordering::Relaxed),
            deallocation_count: self.deallocation_count.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        let current = self.allocated_bytes.load(Ordering::Relaxed);
        self.peak_allocated_bytes.store(current, Ordering::Relaxed);
        self.allocation_count.store(0, Ordering::Relaxed);
        self.deallocation_count.store(0, Ordering::Relaxed);
        self.failed_allocations.store(0, Ordering::Relaxed);
    }
}

/// A wrapper allocator that tracks memory usage statistics
///
/// # Thread Safety
/// Thread-safe whenever the inner allocator is.
#[derive(Debug)]
pub struct TrackedAllocator<A> {
    inner: A,
    stats: AtomicStats,
}

impl<A> TrackedAllocator<A> {
    /// Creates a new TrackedAllocator wrapping the provided allocator
    ///
    /// `const`, so a tracker can live in a `static` and be installed as a
    /// default allocator.
    pub const fn new(allocator: A) -> Self {
        Self {
            inner: allocator,
            stats: AtomicStats::new(),
        }
    }

    /// Gets a reference to the underlying allocator
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Consumes the tracker and returns the underlying allocator
    pub fn into_inner(self) -> A {
        self.inner
    }

    /// Returns the total bytes currently allocated
    pub fn allocated_bytes(&self) -> usize {
        self.stats.allocated_bytes.load(Ordering::Relaxed)
    }

    /// Returns the peak bytes allocated
    pub fn peak_allocated_bytes(&self) -> usize {
        self.stats.peak_allocated_bytes.load(Ordering::Relaxed)
    }

    /// Returns the total number of allocations performed
    pub fn allocation_count(&self) -> usize {
        self.stats.allocation_count.load(Ordering::Relaxed)
    }

    /// Returns the total number of deallocations performed
    pub fn deallocation_count(&self) -> usize {
        self.stats.deallocation_count.load(Ordering::Relaxed)
    }

    /// Returns the number of failed allocations
    pub fn failed_allocations(&self) -> usize {
        self.stats.failed_allocations.load(Ordering::Relaxed)
    }

    /// Reset counters while keeping the live byte count
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Get a statistics snapshot
    pub fn stats(&self) -> AllocationStats {
        self.stats.snapshot()
    }

    /// Check if there are any memory leaks (allocations > deallocations)
    pub fn has_leaks(&self) -> bool {
        self.potential_leaks() > 0
    }

    /// Get the number of potentially leaked allocations
    pub fn potential_leaks(&self) -> usize {
        let stats = self.stats.snapshot();
        stats
            .allocation_count
            .saturating_sub(stats.deallocation_count)
    }
}

// SAFETY: TrackedAllocator implements Allocator by forwarding to inner allocator.
// - All unsafe trait methods forward to A's implementation with same contracts
// - Statistics tracking is side-effect only (no memory safety impact)
unsafe impl<A: Allocator> Allocator for TrackedAllocator<A> {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarding to inner allocator with the caller's layout.
        match unsafe { self.inner.allocate(layout) } {
            Ok(ptr) => {
                self.stats.record_allocation(layout.size());
                Ok(ptr)
            }
            Err(err) => {
                self.stats.record_failure();
                Err(err)
            }
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: caller guarantees ptr/layout came from our allocate, which
        // forwarded to inner.
        unsafe { self.inner.deallocate(ptr, layout) };
        self.stats.record_deallocation(layout.size());
    }

    fn is_valid(&self, layout: Layout) -> bool {
        self.inner.is_valid(layout)
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: forwarding to inner allocator with the caller's contract.
        match unsafe { self.inner.reallocate(ptr, old_layout, new_layout) } {
            Ok(new_ptr) => {
                self.stats.record_deallocation(old_layout.size());
                self.stats.record_allocation(new_layout.size());
                Ok(new_ptr)
            }
            Err(err) => {
                self.stats.record_failure();
                Err(err)
            }
        }
    }
}
