//! Polymorphic allocator handle
//!
//! [`PolymorphicAllocator`] is the stateful capability: a copyable pointer to
//! some shared `dyn Allocator`. Copying the handle copies the pointer; the
//! allocator behind it is never duplicated.

use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;

use super::{AllocResult, Allocator, thread_default};

/// Handle to a shared allocator chosen at runtime
///
/// `Default` resolves the calling thread's default allocator at the moment
/// of construction (see [`thread_default`]). Two handles compare equal when
/// they point at the same allocator instance.
#[derive(Clone, Copy)]
pub struct PolymorphicAllocator {
    resource: &'static dyn Allocator,
}

impl PolymorphicAllocator {
    /// Handle to a specific allocator
    #[inline]
    pub const fn new(resource: &'static dyn Allocator) -> Self {
        Self { resource }
    }

    /// The allocator this handle forwards to
    #[inline]
    pub fn resource(&self) -> &'static dyn Allocator {
        self.resource
    }
}

impl Default for PolymorphicAllocator {
    #[inline]
    fn default() -> Self {
        Self::new(thread_default())
    }
}

impl PartialEq for PolymorphicAllocator {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::addr_eq(self.resource, other.resource)
    }
}

impl Eq for PolymorphicAllocator {}

impl fmt::Debug for PolymorphicAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolymorphicAllocator")
            .field("resource", &core::ptr::from_ref(self.resource).cast::<()>())
            .finish()
    }
}

// SAFETY: pure delegation to the pointed-to allocator.
unsafe impl Allocator for PolymorphicAllocator {
    #[inline]
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: same contract as the resource's allocate
        unsafe { self.resource.allocate(layout) }
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: ptr came from this handle, hence from the same resource
        unsafe { self.resource.deallocate(ptr, layout) }
    }

    fn is_valid(&self, layout: Layout) -> bool {
        self.resource.is_valid(layout)
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        // SAFETY: same contract as the resource's reallocate
        unsafe { self.resource.reallocate(ptr, old_layout, new_layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{SystemAllocator, TrackedAllocator, with_thread_default};

    static TRACKED: TrackedAllocator<SystemAllocator> =
        TrackedAllocator::new(SystemAllocator::new());

    #[test]
    fn default_captures_thread_default() {
        let handle = with_thread_default(&TRACKED, PolymorphicAllocator::default);
        assert_eq!(handle, PolymorphicAllocator::new(&TRACKED));

        // Captured at construction, not re-resolved per call.
        let layout = Layout::new::<[u64; 4]>();
        let before = TRACKED.allocation_count();
        unsafe {
            let ptr = handle.allocate(layout).unwrap();
            handle.deallocate(ptr.cast(), layout);
        }
        assert!(TRACKED.allocation_count() > before);
    }

    #[test]
    fn copies_share_the_resource() {
        let a = PolymorphicAllocator::new(&TRACKED);
        let b = a;
        assert_eq!(a, b);
        assert!(core::ptr::addr_eq(a.resource(), b.resource()));
    }

    #[test]
    fn handle_is_one_pointer_wide() {
        assert_eq!(
            size_of::<PolymorphicAllocator>(),
            size_of::<&'static dyn Allocator>()
        );
    }
}
