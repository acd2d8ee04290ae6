//! The allocator capability
//!
//! An [`Allocator`] only reserves and releases byte ranges; it never
//! constructs or destroys objects (that is the [`Factory`] capability).
//! The trait is object safe so a single `&'static dyn Allocator` can stand in
//! for any concrete allocator (see [`PolymorphicAllocator`]).
//!
//! # Safety
//!
//! ## Trait Safety Contract
//!
//! Implementors must guarantee that:
//! - Returned pointers are valid for reads and writes of `layout.size()` bytes
//! - Returned pointers are aligned to at least `layout.align()`
//! - Distinct live allocations never overlap
//! - Zero-sized requests never touch backing storage
//!
//! ## Default Implementation Safety
//!
//! The provided `reallocate`/`grow`/`shrink` only compose `allocate`,
//! `copy_nonoverlapping` and `deallocate`, so they inherit the contract of the
//! two required methods.
//!
//! [`Factory`]: crate::factory::Factory
//! [`PolymorphicAllocator`]: super::PolymorphicAllocator

use core::alloc::Layout;
use core::ptr::NonNull;

use super::{AllocError, AllocResult};

/// Validation of layout parameters
///
/// `Layout` already enforces most of this; the check exists for layouts
/// assembled from runtime element sizes (see the erased allocator).
#[inline]
pub(crate) fn validate_layout(layout: Layout) -> AllocResult<()> {
    if !layout.align().is_power_of_two() {
        return Err(AllocError::invalid_alignment(layout.align()));
    }

    if layout.size() == 0 {
        return Ok(());
    }

    if layout.size() > isize::MAX as usize - (layout.align() - 1) {
        return Err(AllocError::allocation_too_large(
            layout.size(),
            isize::MAX as usize - (layout.align() - 1),
        ));
    }

    Ok(())
}

/// Non-null pointer aligned to `layout.align()` that owns no storage
///
/// Handed out for zero-sized requests; deallocating it is a no-op.
#[inline]
pub(crate) fn dangling(layout: Layout) -> NonNull<[u8]> {
    let addr = core::ptr::without_provenance_mut::<u8>(layout.align());
    // SAFETY: Layout guarantees align() is a non-zero power of two.
    let ptr = unsafe { NonNull::new_unchecked(addr) };
    NonNull::slice_from_raw_parts(ptr, 0)
}

/// Layout for `count` elements of `elem_size` bytes at `align`
///
/// Fails with `SizeOverflow` when the byte count does not fit.
#[inline]
pub(crate) fn array_layout(elem_size: usize, align: usize, count: usize) -> AllocResult<Layout> {
    if !align.is_power_of_two() {
        return Err(AllocError::invalid_alignment(align));
    }

    let size = elem_size
        .checked_mul(count)
        .ok_or_else(|| AllocError::size_overflow("array layout"))?;

    Layout::from_size_align(size, align).map_err(|_| AllocError::size_overflow("array layout"))
}

/// Raw-byte provider
///
/// # Safety Requirements
///
/// Implementors must ensure that:
/// - Returned pointers are valid for the requested lifetime
/// - Memory is properly aligned according to the layout
/// - Deallocation only occurs for previously allocated pointers
/// - Layout information matches between allocation and deallocation
pub unsafe trait Allocator {
    /// Allocates memory with the given layout
    ///
    /// # Safety
    /// - Returned pointer must be valid for reads and writes
    /// - Pointer must be properly aligned according to layout
    /// - Memory content is uninitialized and must be initialized before use
    ///
    /// # Errors
    /// - Returns error if memory cannot be allocated
    /// - Returns error for invalid layout parameters
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>>;

    /// Deallocates memory at the given pointer with the specified layout
    ///
    /// # Safety
    /// - `ptr` must have been allocated by this allocator
    /// - `layout` must match the original allocation layout exactly
    /// - After this call, `ptr` becomes invalid and must not be used
    /// - Double-free is undefined behavior
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Reports whether a request with this layout can be serviced at all
    ///
    /// A `true` answer does not promise that memory is available, only that
    /// the size/alignment combination is one this allocator accepts.
    fn is_valid(&self, layout: Layout) -> bool {
        validate_layout(layout).is_ok()
    }

    /// Attempts to extend or shrink an existing allocation
    ///
    /// # Safety
    /// - `ptr` must have been allocated by this allocator
    /// - `old_layout` must match the original allocation layout exactly
    /// - If successful, the old pointer becomes invalid
    /// - On error the old allocation is left untouched
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        validate_layout(new_layout)?;

        if old_layout == new_layout {
            return Ok(NonNull::slice_from_raw_parts(ptr, new_layout.size()));
        }

        if new_layout.size() >= old_layout.size() {
            // SAFETY: caller contract forwarded; size grows or alignment changes.
            unsafe { self.grow(ptr, old_layout, new_layout) }
        } else {
            // SAFETY: caller contract forwarded; new size is smaller.
            unsafe { self.shrink(ptr, old_layout, new_layout) }
        }
    }

    /// Attempts to extend an existing allocation
    ///
    /// Default implementation allocates, copies `old_layout.size()` bytes and
    /// releases the old block.
    ///
    /// # Safety
    /// - Same requirements as `reallocate`
    /// - `new_layout.size()` must be greater than or equal to `old_layout.size()`
    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        debug_assert!(new_layout.size() >= old_layout.size());

        // SAFETY: new_layout validated by the caller path.
        let new_ptr = unsafe { self.allocate(new_layout)? };

        // SAFETY: Copying data from old allocation to new allocation.
        // - ptr is valid for reads of old_layout.size() bytes (caller contract)
        // - new_ptr is valid for writes of at least that many bytes
        // - the regions are distinct allocations
        unsafe {
            core::ptr::copy_nonoverlapping(
                ptr.as_ptr().cast_const(),
                new_ptr.as_ptr().cast::<u8>(),
                old_layout.size(),
            );
            self.deallocate(ptr, old_layout);
        }
        Ok(new_ptr)
    }

    /// Attempts to shrink an existing allocation
    ///
    /// Default implementation reallocates, since an allocator cannot in
    /// general release the tail of a block it handed out.
    ///
    /// # Safety
    /// - Same requirements as `reallocate`
    /// - `new_layout.size()` must be less than or equal to `old_layout.size()`
    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        debug_assert!(new_layout.size() <= old_layout.size());

        // SAFETY: new_layout validated by the caller path.
        let new_ptr = unsafe { self.allocate(new_layout)? };

        // SAFETY: only the surviving prefix is copied; both blocks are live
        // and distinct until the old one is released below.
        unsafe {
            core::ptr::copy_nonoverlapping(
                ptr.as_ptr().cast_const(),
                new_ptr.as_ptr().cast::<u8>(),
                new_layout.size(),
            );
            self.deallocate(ptr, old_layout);
        }
        Ok(new_ptr)
    }
}

// ============================================================================
// Blanket implementations for references
// ============================================================================

/// Blanket implementation of Allocator for references
///
/// # Safety
///
/// Forwards every call to the underlying `T: Allocator`; no new unsafe
/// operations are introduced.
unsafe impl<T: Allocator + ?Sized> Allocator for &T {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: same contract as T::allocate
        unsafe { (**self).allocate(layout) }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: same contract as T::deallocate
        unsafe { (**self).deallocate(ptr, layout) }
    }

    fn is_valid(&self, layout: Layout) -> bool {
        (**self).is_valid(layout)
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: same contract as T::reallocate
        unsafe { (**self).reallocate(ptr, old_layout, new_layout) }
    }

    unsafe fn grow(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: same contract as T::grow
        unsafe { (**self).grow(ptr, old_layout, new_layout) }
    }

    unsafe fn shrink(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: same contract as T::shrink
        unsafe { (**self).shrink(ptr, old_layout, new_layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_oversized_layout() {
        let layout = Layout::from_size_align(isize::MAX as usize - 7, 8).unwrap();
        assert!(validate_layout(layout).is_ok());

        let huge = Layout::from_size_align(isize::MAX as usize - 64, 64).unwrap();
        assert!(validate_layout(huge).is_err());
    }

    #[test]
    fn array_layout_reports_overflow() {
        let err = array_layout(usize::MAX / 2, 8, 4).unwrap_err();
        assert_eq!(err.code(), "MEM:ALLOC:OVERFLOW");
    }

    #[test]
    fn array_layout_rejects_bad_alignment() {
        let err = array_layout(8, 3, 4).unwrap_err();
        assert!(err.is_invalid_alignment());
    }

    #[test]
    fn array_layout_multiplies_count() {
        let layout = array_layout(12, 4, 5).unwrap();
        assert_eq!(layout.size(), 60);
        assert_eq!(layout.align(), 4);
    }
}
