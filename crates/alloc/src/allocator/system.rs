//! System allocator implementation
//!
//! Wraps the platform allocator (`std::alloc::System`). This is the allocator
//! that terminates the default-resolution chain when neither a thread-local
//! nor a process-global default has been installed.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::NonNull;
use std::alloc::System;

use super::traits::{dangling, validate_layout};
use super::{AllocError, AllocResult, Allocator};

/// Wrapper for the system's default allocator
///
/// Zero-sized, so containers parameterized over it carry no allocator
/// storage at all.
///
/// # Thread Safety
/// The system allocator is inherently thread-safe as it uses the platform's
/// default memory management which handles concurrent allocations properly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemAllocator;

impl SystemAllocator {
    /// Creates a new SystemAllocator
    #[inline]
    pub const fn new() -> Self {
        Self
    }
}

unsafe impl Allocator for SystemAllocator {
    #[inline]
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        validate_layout(layout)?;

        if layout.size() == 0 {
            return Ok(dangling(layout));
        }

        // SAFETY: layout has non-zero size (checked above).
        let ptr = unsafe { System.alloc(layout) };

        match NonNull::new(ptr) {
            Some(ptr) => Ok(NonNull::slice_from_raw_parts(ptr, layout.size())),
            None => Err(AllocError::allocation_failed_with_layout(layout)),
        }
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        // SAFETY: caller guarantees ptr came from `allocate` with this layout.
        unsafe { System.dealloc(ptr.as_ptr(), layout) };
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        validate_layout(new_layout)?;

        // The platform realloc keeps alignment only when it is unchanged, and
        // it cannot start from or end at a zero-sized block.
        if old_layout.align() == new_layout.align()
            && old_layout.size() > 0
            && new_layout.size() > 0
        {
            // SAFETY: ptr was allocated by System with old_layout (caller
            // contract) and the new size is non-zero.
            let new_ptr = unsafe { System.realloc(ptr.as_ptr(), old_layout, new_layout.size()) };
            return match NonNull::new(new_ptr) {
                Some(p) => Ok(NonNull::slice_from_raw_parts(p, new_layout.size())),
                None => Err(AllocError::allocation_failed_with_layout(new_layout)),
            };
        }

        let new_ptr = unsafe { self.allocate(new_layout)? };

        let copy_size = old_layout.size().min(new_layout.size());
        // SAFETY: both blocks are live and distinct; copy_size fits both.
        unsafe {
            core::ptr::copy_nonoverlapping(
                ptr.as_ptr().cast_const(),
                new_ptr.as_ptr().cast::<u8>(),
                copy_size,
            );
            self.deallocate(ptr, old_layout);
        }
        Ok(new_ptr)
    }
}
