use core::alloc::Layout;
use core::ptr::NonNull;

use super::Allocator;

/// Returns a freshly allocated block to its allocator unless released
///
/// Keeps fused operations (allocate then construct) from leaking the block
/// when construction faults.
pub(crate) struct BlockGuard<'a, A: Allocator + ?Sized> {
    alloc: &'a A,
    ptr: NonNull<u8>,
    layout: Layout,
    owned: bool,
}

impl<'a, A: Allocator + ?Sized> BlockGuard<'a, A> {
    /// # Safety
    /// `ptr` must have been allocated by `alloc` with `layout` and must not be
    /// deallocated by anyone else while the guard owns it.
    pub(crate) unsafe fn new(alloc: &'a A, ptr: NonNull<u8>, layout: Layout) -> Self {
        Self {
            alloc,
            ptr,
            layout,
            owned: true,
        }
    }

    /// Hands the block back to the caller
    pub(crate) fn release(mut self) -> NonNull<u8> {
        self.owned = false;
        self.ptr
    }
}

impl<A: Allocator + ?Sized> Drop for BlockGuard<'_, A> {
    fn drop(&mut self) {
        if self.owned {
            // SAFETY: constructor contract
            unsafe { self.alloc.deallocate(self.ptr, self.layout) };
        }
    }
}
