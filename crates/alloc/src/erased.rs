//! Type-erased allocator
//!
//! [`TypeErasedAllocator`] offers the [`TypedAllocator`] surface over raw
//! `NonNull<u8>` pointers. The element type is bound once, at construction,
//! through an [`ErasedFactory`]; every count is still in elements of that
//! type.
//!
//! [`TypedAllocator`]: crate::typed::TypedAllocator

use core::alloc::Layout;
use core::any::TypeId;
use core::ptr::NonNull;

use crate::allocator::{AllocResult, Allocator, BlockGuard, PolymorphicAllocator};
use crate::error::MemoryError;
use crate::factory::{ErasedFactory, FactoryFlags};
use crate::storage::AllocatorStorage;

/// Allocator plus runtime operation table for a single element type
#[derive(Debug, Clone, Copy)]
pub struct TypeErasedAllocator<A = PolymorphicAllocator> {
    alloc: AllocatorStorage<A>,
    factory: ErasedFactory,
}

impl<A: Allocator> TypeErasedAllocator<A> {
    pub const fn new(alloc: A, factory: ErasedFactory) -> Self {
        Self {
            alloc: AllocatorStorage::new(alloc),
            factory,
        }
    }

    /// Erased allocator for `T` with move and destroy support
    pub fn of<T: 'static>(alloc: A) -> Self {
        Self::new(alloc, ErasedFactory::of::<T>())
    }

    pub fn allocator(&self) -> &A {
        self.alloc.get()
    }

    pub fn factory(&self) -> &ErasedFactory {
        &self.factory
    }

    /// Swaps the allocator; blocks obtained from the old one must be
    /// released through it
    pub fn replace_allocator(&mut self, alloc: A) -> A {
        core::mem::replace(self.alloc.get_mut(), alloc)
    }

    /// Rebinds the element type
    pub fn replace_factory(&mut self, factory: ErasedFactory) -> ErasedFactory {
        core::mem::replace(&mut self.factory, factory)
    }

    /// Size in bytes of one element
    #[inline]
    pub fn type_size(&self) -> usize {
        self.factory.size()
    }

    /// Natural alignment of one element
    #[inline]
    pub fn type_align(&self) -> usize {
        self.factory.align()
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.factory.type_id()
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.factory.type_name()
    }

    /// Whether elements may be bulk-copied as raw bytes
    #[inline]
    pub fn trivial_copy(&self) -> bool {
        self.factory.trivial_copy()
    }

    pub fn flags(&self) -> FactoryFlags {
        self.factory.flags()
    }

    /// Layout of `count` elements at `align` (raised to the element alignment)
    pub fn layout(&self, count: usize, align: usize) -> AllocResult<Layout> {
        self.factory
            .layout_for(count)?
            .align_to(align)
            .map_err(|_| MemoryError::invalid_alignment(align))
    }

    // ========================================================================
    // Raw storage
    // ========================================================================

    pub fn allocate(&self, count: usize) -> AllocResult<NonNull<u8>> {
        self.allocate_aligned(count, self.type_align())
    }

    pub fn allocate_aligned(&self, count: usize, align: usize) -> AllocResult<NonNull<u8>> {
        let layout = self.layout(count, align)?;
        // SAFETY: layout validated above.
        let block = unsafe { self.alloc.allocate(layout)? };
        Ok(block.cast())
    }

    /// # Safety
    /// `ptr` must come from `allocate(count)` on an equivalent allocator and
    /// hold no live elements.
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>, count: usize) {
        // SAFETY: forwarded caller contract
        unsafe { self.deallocate_aligned(ptr, count, self.type_align()) }
    }

    /// # Safety
    /// Same as [`deallocate`](Self::deallocate), with the allocation's `align`.
    pub unsafe fn deallocate_aligned(&self, ptr: NonNull<u8>, count: usize, align: usize) {
        let layout = self.layout(count, align);
        debug_assert!(
            layout.is_ok(),
            "deallocating a block with a layout that could never have been allocated"
        );
        if let Ok(layout) = layout {
            // SAFETY: forwarded caller contract
            unsafe { self.alloc.deallocate(ptr, layout) };
        }
    }

    // ========================================================================
    // Element lifecycle
    // ========================================================================

    /// Default-constructs `count` elements
    ///
    /// # Safety
    /// `ptr` must be valid for `count` element writes.
    pub unsafe fn construct(&self, ptr: NonNull<u8>, count: usize) -> AllocResult<()> {
        // SAFETY: forwarded caller contract
        unsafe { self.factory.construct_default(ptr, count) }
    }

    /// Copy-constructs `count` elements
    ///
    /// Uses a raw byte copy when [`trivial_copy`](Self::trivial_copy) holds.
    ///
    /// # Safety
    /// `src` must hold `count` live elements and `dst` must be valid for
    /// `count` writes; the ranges must not overlap.
    pub unsafe fn copy(&self, dst: NonNull<u8>, src: NonNull<u8>, count: usize) -> AllocResult<()> {
        if self.trivial_copy() {
            // SAFETY: caller contract; elements are plain bytes.
            unsafe {
                core::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), self.type_size() * count);
            }
            return Ok(());
        }
        // SAFETY: forwarded caller contract
        unsafe { self.factory.copy_to(dst, src, count) }
    }

    /// Relocates `count` elements
    ///
    /// # Safety
    /// See [`Factory::move_to`](crate::factory::Factory::move_to).
    pub unsafe fn move_to(&self, dst: NonNull<u8>, src: NonNull<u8>, count: usize) {
        // SAFETY: forwarded caller contract
        unsafe { self.factory.move_to(dst, src, count) }
    }

    /// # Safety
    /// `ptr` must hold `count` live elements.
    pub unsafe fn destroy(&self, ptr: NonNull<u8>, count: usize) {
        // SAFETY: forwarded caller contract
        unsafe { self.factory.destroy(ptr, count) }
    }

    // ========================================================================
    // Fused operations
    // ========================================================================

    /// Allocates and default-constructs `count` elements
    ///
    /// Fails with `NotSupported` when no default constructor was registered;
    /// nothing stays allocated in that case.
    pub fn allocate_and_construct(&self, count: usize) -> AllocResult<NonNull<u8>> {
        self.allocate_and_construct_aligned(count, self.type_align())
    }

    pub fn allocate_and_construct_aligned(&self, count: usize, align: usize) -> AllocResult<NonNull<u8>> {
        let layout = self.layout(count, align)?;
        // SAFETY: layout validated above.
        let block = unsafe { self.alloc.allocate(layout)? }.cast::<u8>();
        // SAFETY: fresh block from this allocator with layout.
        let guard = unsafe { BlockGuard::new(self.alloc.get(), block, layout) };
        // SAFETY: fresh block, valid for count element writes.
        unsafe { self.factory.construct_default(block, count)? };
        Ok(guard.release())
    }

    /// # Safety
    /// `ptr` must come from `allocate(count)` and hold `count` live elements.
    pub unsafe fn destroy_and_deallocate(&self, ptr: NonNull<u8>, count: usize) {
        // SAFETY: forwarded caller contract
        unsafe { self.destroy_and_deallocate_aligned(ptr, count, self.type_align()) }
    }

    /// # Safety
    /// Same as [`destroy_and_deallocate`](Self::destroy_and_deallocate), with
    /// the allocation's `align`.
    pub unsafe fn destroy_and_deallocate_aligned(&self, ptr: NonNull<u8>, count: usize, align: usize) {
        // SAFETY: forwarded caller contract
        unsafe {
            self.factory.destroy(ptr, count);
            self.deallocate_aligned(ptr, count, align);
        }
    }

    /// Relocates `old_count` elements into a block of `new_count`
    ///
    /// Same contract as `TypedAllocator::reallocate`.
    ///
    /// # Safety
    /// `ptr` must come from `allocate(old_count)` and hold `old_count` live
    /// elements.
    pub unsafe fn reallocate(&self, ptr: NonNull<u8>, old_count: usize, new_count: usize) -> AllocResult<NonNull<u8>> {
        // SAFETY: forwarded caller contract
        unsafe { self.reallocate_aligned(ptr, old_count, new_count, self.type_align()) }
    }

    /// # Safety
    /// Same as [`reallocate`](Self::reallocate), with the allocation's `align`.
    pub unsafe fn reallocate_aligned(
        &self,
        ptr: NonNull<u8>,
        old_count: usize,
        new_count: usize,
        align: usize,
    ) -> AllocResult<NonNull<u8>> {
        let new_ptr = self.allocate_aligned(new_count, align)?;
        let kept = old_count.min(new_count);
        let size = self.type_size();

        // SAFETY: ptr holds old_count live elements; new_ptr is fresh.
        unsafe {
            self.factory.move_to(new_ptr, ptr, kept);
            if old_count > kept {
                self.factory.destroy(ptr.add(kept * size), old_count - kept);
            }
            self.deallocate_aligned(ptr, old_count, align);
        }
        Ok(new_ptr)
    }

    /// Grows a block and default-constructs the new tail
    ///
    /// The tail is built before the prefix moves, so any failure leaves `ptr`
    /// and its elements untouched.
    ///
    /// # Safety
    /// Same as [`reallocate`](Self::reallocate).
    pub unsafe fn reallocate_and_construct(
        &self,
        ptr: NonNull<u8>,
        old_count: usize,
        new_count: usize,
    ) -> AllocResult<NonNull<u8>> {
        // SAFETY: forwarded caller contract
        unsafe { self.reallocate_and_construct_aligned(ptr, old_count, new_count, self.type_align()) }
    }

    /// # Safety
    /// Same as [`reallocate_aligned`](Self::reallocate_aligned).
    pub unsafe fn reallocate_and_construct_aligned(
        &self,
        ptr: NonNull<u8>,
        old_count: usize,
        new_count: usize,
        align: usize,
    ) -> AllocResult<NonNull<u8>> {
        if new_count <= old_count {
            // SAFETY: forwarded caller contract
            return unsafe { self.reallocate_aligned(ptr, old_count, new_count, align) };
        }

        let layout = self.layout(new_count, align)?;
        // SAFETY: layout validated above.
        let block = unsafe { self.alloc.allocate(layout)? }.cast::<u8>();
        // SAFETY: fresh block from this allocator with layout.
        let guard = unsafe { BlockGuard::new(self.alloc.get(), block, layout) };

        // SAFETY: tail slots of the fresh block are writable.
        unsafe {
            self.factory
                .construct_default(block.add(old_count * self.type_size()), new_count - old_count)?;
        }
        let block = guard.release();

        // SAFETY: prefix slots untouched; relocation cannot fault.
        unsafe {
            self.factory.move_to(block, ptr, old_count);
            self.deallocate_aligned(ptr, old_count, align);
        }
        Ok(block)
    }
}

impl<A: Allocator + Default> TypeErasedAllocator<A> {
    /// Erased allocator for `factory` over a default-constructed allocator
    pub fn with_factory(factory: ErasedFactory) -> Self {
        Self::new(A::default(), factory)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::allocator::{SystemAllocator, TrackedAllocator};

    type Tracked = TrackedAllocator<SystemAllocator>;

    fn erased(factory: ErasedFactory) -> (TypeErasedAllocator<&'static Tracked>, &'static Tracked) {
        let tracker: &'static Tracked = Box::leak(Box::new(Tracked::new(SystemAllocator::new())));
        (TypeErasedAllocator::new(tracker, factory), tracker)
    }

    #[rstest]
    #[case(ErasedFactory::of::<u8>(), 1, TypeId::of::<u8>())]
    #[case(ErasedFactory::of::<u64>(), 8, TypeId::of::<u64>())]
    #[case(ErasedFactory::of::<[u16; 3]>(), 6, TypeId::of::<[u16; 3]>())]
    #[case(ErasedFactory::of::<String>(), size_of::<String>(), TypeId::of::<String>())]
    fn reports_element_type(#[case] factory: ErasedFactory, #[case] size: usize, #[case] id: TypeId) {
        let alloc = TypeErasedAllocator::new(SystemAllocator::new(), factory);
        assert_eq!(alloc.type_size(), size);
        assert_eq!(alloc.type_id(), id);
    }

    #[test]
    fn trivial_copy_follows_factory_choice() {
        assert!(TypeErasedAllocator::new(SystemAllocator::new(), ErasedFactory::of_bitwise::<u32>()).trivial_copy());
        assert!(!TypeErasedAllocator::new(SystemAllocator::new(), ErasedFactory::of_clone::<String>()).trivial_copy());
        // Copy types are only reported trivial through the bitwise table.
        assert!(!ErasedFactory::of::<u64>().trivial_copy());
        assert!(ErasedFactory::of_bitwise::<u64>().trivial_copy());
    }

    #[test]
    fn construct_copy_destroy_strings() {
        let (alloc, tracker) = erased(ErasedFactory::of_clone::<String>());

        let src = alloc.allocate_and_construct(2).unwrap();
        unsafe {
            *src.cast::<String>().as_mut() = String::from("left");
            *src.cast::<String>().add(1).as_mut() = String::from("right");

            let dst = alloc.allocate(2).unwrap();
            alloc.copy(dst, src, 2).unwrap();
            assert_eq!(dst.cast::<String>().add(1).as_ref(), "right");

            alloc.destroy_and_deallocate(src, 2);
            alloc.destroy_and_deallocate(dst, 2);
        }
        assert!(!tracker.has_leaks());
    }

    #[test]
    fn bitwise_copy_path() {
        let (alloc, tracker) = erased(ErasedFactory::of_bitwise::<u32>());

        let src = alloc.allocate_and_construct(4).unwrap();
        unsafe {
            for i in 0..4 {
                src.cast::<u32>().add(i).write(i as u32 * 10);
            }
            let dst = alloc.allocate(4).unwrap();
            alloc.copy(dst, src, 4).unwrap();
            assert_eq!(core::slice::from_raw_parts(dst.cast::<u32>().as_ptr(), 4), &[0, 10, 20, 30]);

            alloc.deallocate(src, 4);
            alloc.deallocate(dst, 4);
        }
        assert!(!tracker.has_leaks());
    }

    #[test]
    fn missing_default_releases_block() {
        let (alloc, tracker) = erased(ErasedFactory::of::<String>());

        let err = alloc.allocate_and_construct(3).unwrap_err();
        assert_eq!(err.code(), "MEM:FEATURE:UNSUPPORTED");
        assert!(!tracker.has_leaks());
    }

    #[test]
    fn reallocate_and_construct_keeps_prefix() {
        let (alloc, tracker) = erased(ErasedFactory::of_clone::<String>());

        let ptr = alloc.allocate_and_construct(1).unwrap();
        unsafe {
            *ptr.cast::<String>().as_mut() = String::from("kept");
            let ptr = alloc.reallocate_and_construct(ptr, 1, 3).unwrap();
            let values = core::slice::from_raw_parts(ptr.cast::<String>().as_ptr(), 3);
            assert_eq!(values, ["kept", "", ""]);

            let ptr = alloc.reallocate(ptr, 3, 1).unwrap();
            assert_eq!(ptr.cast::<String>().as_ref(), "kept");
            alloc.destroy_and_deallocate(ptr, 1);
        }
        assert!(!tracker.has_leaks());
    }

    #[test]
    fn over_aligned_allocation() {
        let (alloc, tracker) = erased(ErasedFactory::of::<u16>());

        let ptr = alloc.allocate_aligned(5, 128).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 128, 0);
        unsafe { alloc.deallocate_aligned(ptr, 5, 128) };
        assert!(!tracker.has_leaks());
    }
}
