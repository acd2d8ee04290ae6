//! Memory resource bases
//!
//! A resource base owns exactly one block and the allocator it came from. It
//! is mechanism for a composing container: it knows the block's capacity and
//! alignment but never how many elements in it are live. That bookkeeping,
//! and destroying live elements before the base goes away, belong to the
//! owner. Dropping a base releases its block without running any element
//! destructor.
//!
//! Invariant: a block is held iff `capacity() > 0`.

use core::fmt;
use core::ptr::NonNull;

use crate::allocator::{AllocResult, Allocator, PolymorphicAllocator};
use crate::erased::TypeErasedAllocator;
use crate::error::MemoryError;
use crate::factory::{DefaultFactory, ErasedFactory, Factory};
use crate::typed::TypedAllocator;

// ============================================================================
// Typed resource base
// ============================================================================

/// One block of `T` slots plus the typed allocator that owns it
pub struct ResourceBase<T, A = PolymorphicAllocator, F = DefaultFactory<T>>
where
    A: Allocator,
    F: Factory<Item = T>,
{
    ptr: Option<NonNull<T>>,
    capacity: usize,
    align: usize,
    alloc: TypedAllocator<T, A, F>,
}

impl<T, A, F> ResourceBase<T, A, F>
where
    A: Allocator,
    F: Factory<Item = T>,
{
    pub const fn new(alloc: TypedAllocator<T, A, F>) -> Self {
        Self {
            ptr: None,
            capacity: 0,
            align: align_of::<T>(),
            alloc,
        }
    }

    #[inline]
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Alignment the held block was allocated with
    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.ptr.is_some()
    }

    pub fn allocator(&self) -> &TypedAllocator<T, A, F> {
        &self.alloc
    }

    /// Acquires a block of `capacity` slots at the natural alignment
    ///
    /// Fails with `InvalidState` while a block is already held. A zero
    /// capacity holds nothing and returns a dangling pointer.
    pub fn allocate(&mut self, capacity: usize) -> AllocResult<NonNull<T>> {
        self.allocate_aligned(capacity, align_of::<T>())
    }

    /// Acquires a block of `capacity` slots at `align`
    pub fn allocate_aligned(&mut self, capacity: usize, align: usize) -> AllocResult<NonNull<T>> {
        if self.ptr.is_some() {
            return Err(MemoryError::invalid_state("resource already holds a block"));
        }

        let ptr = self.alloc.allocate_aligned(capacity, align)?;
        self.install(ptr, capacity, align);
        Ok(ptr)
    }

    fn install(&mut self, ptr: NonNull<T>, capacity: usize, align: usize) {
        let align = align.max(align_of::<T>());
        if capacity == 0 {
            // Zero-capacity blocks are dangling; nothing to hold.
            // SAFETY: zero-capacity blocks never reach the heap.
            unsafe { self.alloc.deallocate_aligned(ptr, 0, align) };
            self.ptr = None;
        } else {
            self.ptr = Some(ptr);
        }
        self.capacity = capacity;
        self.align = align;
    }

    fn slots(&self, start: usize, count: usize) -> NonNull<T> {
        debug_assert!(
            start.checked_add(count).is_some_and(|end| end <= self.capacity),
            "slot range {start}..{start}+{count} exceeds capacity {}",
            self.capacity
        );
        match self.ptr {
            // SAFETY: start is within the held block (checked above in debug).
            Some(ptr) => unsafe { ptr.add(start) },
            None => NonNull::dangling(),
        }
    }

    /// Builds `init(i)` into slots `start..start + count`
    ///
    /// # Safety
    /// The slots must lie inside the block and hold no live elements.
    pub unsafe fn construct_with<G>(&mut self, start: usize, count: usize, init: G)
    where
        G: FnMut(usize) -> T,
    {
        let dst = self.slots(start, count);
        // SAFETY: forwarded caller contract
        unsafe { self.alloc.construct_with(dst, count, init) }
    }

    /// Default-constructs slots `start..start + count`
    ///
    /// # Safety
    /// Same as [`construct_with`](Self::construct_with).
    pub unsafe fn construct(&mut self, start: usize, count: usize)
    where
        T: Default,
    {
        let dst = self.slots(start, count);
        // SAFETY: forwarded caller contract
        unsafe { self.alloc.construct(dst, count) }
    }

    /// Drops the elements in slots `start..start + count`
    ///
    /// # Safety
    /// Those slots must hold live elements.
    pub unsafe fn destroy(&mut self, start: usize, count: usize) {
        let ptr = self.slots(start, count);
        // SAFETY: forwarded caller contract
        unsafe { self.alloc.destroy(ptr, count) }
    }

    /// Moves the first `live` elements into a block of `new_capacity`
    ///
    /// Elements past `new_capacity` are dropped. With `new_capacity == 0`
    /// the base ends up holding nothing.
    ///
    /// # Safety
    /// Slots `0..live` must hold live elements and no others may.
    pub unsafe fn reallocate(&mut self, live: usize, new_capacity: usize) -> AllocResult<NonNull<T>> {
        let align = self.align;
        // SAFETY: forwarded caller contract
        unsafe { self.reallocate_aligned(live, new_capacity, align) }
    }

    /// [`reallocate`](Self::reallocate) into a block aligned to `align`
    ///
    /// # Safety
    /// Same as `reallocate`.
    pub unsafe fn reallocate_aligned(
        &mut self,
        live: usize,
        new_capacity: usize,
        align: usize,
    ) -> AllocResult<NonNull<T>> {
        debug_assert!(live <= self.capacity, "more live elements than capacity");

        let Some(old) = self.ptr else {
            return self.allocate_aligned(new_capacity, align);
        };

        let new_ptr = self.alloc.allocate_aligned(new_capacity, align)?;
        let kept = live.min(new_capacity);

        // SAFETY: old holds `live` elements; new_ptr is a fresh block.
        unsafe {
            self.alloc.move_to(new_ptr, old, kept);
            if live > kept {
                self.alloc.destroy(old.add(kept), live - kept);
            }
            self.alloc.deallocate_aligned(old, self.capacity, self.align);
        }

        self.install(new_ptr, new_capacity, align);
        Ok(new_ptr)
    }

    /// Releases the held block without dropping any element
    pub fn deallocate(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            // SAFETY: ptr/capacity/align describe the block we allocated.
            unsafe { self.alloc.deallocate_aligned(ptr, self.capacity, self.align) };
        }
        self.capacity = 0;
        self.align = align_of::<T>();
    }

    /// Releases a block that was acquired with `allocate_aligned(_, align)`
    pub fn deallocate_aligned(&mut self, align: usize) {
        debug_assert_eq!(
            align.max(align_of::<T>()),
            self.align,
            "deallocating with a different alignment than allocated"
        );
        self.deallocate();
    }
}

impl<T, A, F> Default for ResourceBase<T, A, F>
where
    A: Allocator + Default,
    F: Factory<Item = T> + Default,
{
    fn default() -> Self {
        Self::new(TypedAllocator::default())
    }
}

impl<T, A, F> Drop for ResourceBase<T, A, F>
where
    A: Allocator,
    F: Factory<Item = T>,
{
    fn drop(&mut self) {
        self.deallocate();
    }
}

impl<T, A, F> fmt::Debug for ResourceBase<T, A, F>
where
    A: Allocator + fmt::Debug,
    F: Factory<Item = T> + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceBase")
            .field("ptr", &self.ptr)
            .field("capacity", &self.capacity)
            .field("align", &self.align)
            .field("allocator", &self.alloc)
            .finish()
    }
}

// ============================================================================
// Untyped resource base
// ============================================================================

/// One block of erased elements plus its allocator and operation table
///
/// Unlike [`ResourceBase`], the allocator and the element type can be
/// rebound at runtime, but only while no block is held.
#[derive(Debug)]
pub struct ErasedResourceBase<A: Allocator = PolymorphicAllocator> {
    ptr: Option<NonNull<u8>>,
    capacity: usize,
    align: usize,
    alloc: TypeErasedAllocator<A>,
}

impl<A: Allocator> ErasedResourceBase<A> {
    pub fn new(alloc: A, factory: ErasedFactory) -> Self {
        let align = factory.align();
        Self {
            ptr: None,
            capacity: 0,
            align,
            alloc: TypeErasedAllocator::new(alloc, factory),
        }
    }

    pub fn as_ptr(&self) -> Option<NonNull<u8>> {
        self.ptr
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn align(&self) -> usize {
        self.align
    }

    pub fn is_allocated(&self) -> bool {
        self.ptr.is_some()
    }

    pub fn erased_allocator(&self) -> &TypeErasedAllocator<A> {
        &self.alloc
    }

    pub fn get_allocator(&self) -> &A {
        self.alloc.allocator()
    }

    /// Rebinds the allocator; refused while a block is held
    pub fn set_allocator(&mut self, alloc: A) -> AllocResult<()> {
        if self.ptr.is_some() {
            return Err(MemoryError::invalid_state(
                "cannot change allocator while a block is held",
            ));
        }
        self.alloc.replace_allocator(alloc);
        Ok(())
    }

    pub fn get_factory(&self) -> &ErasedFactory {
        self.alloc.factory()
    }

    /// Rebinds the element type; refused while a block is held
    pub fn set_factory(&mut self, factory: ErasedFactory) -> AllocResult<()> {
        if self.ptr.is_some() {
            return Err(MemoryError::invalid_state(
                "cannot change factory while a block is held",
            ));
        }
        self.align = factory.align();
        self.alloc.replace_factory(factory);
        Ok(())
    }

    pub fn allocate(&mut self, capacity: usize) -> AllocResult<NonNull<u8>> {
        let align = self.alloc.type_align();
        self.allocate_aligned(capacity, align)
    }

    pub fn allocate_aligned(&mut self, capacity: usize, align: usize) -> AllocResult<NonNull<u8>> {
        if self.ptr.is_some() {
            return Err(MemoryError::invalid_state("resource already holds a block"));
        }

        let ptr = self.alloc.allocate_aligned(capacity, align)?;
        self.install(ptr, capacity, align);
        Ok(ptr)
    }

    fn install(&mut self, ptr: NonNull<u8>, capacity: usize, align: usize) {
        let align = align.max(self.alloc.type_align());
        if capacity == 0 {
            // SAFETY: zero-capacity blocks never reach the heap.
            unsafe { self.alloc.deallocate_aligned(ptr, 0, align) };
            self.ptr = None;
        } else {
            self.ptr = Some(ptr);
        }
        self.capacity = capacity;
        self.align = align;
    }

    fn slots(&self, start: usize, count: usize) -> NonNull<u8> {
        debug_assert!(
            start.checked_add(count).is_some_and(|end| end <= self.capacity),
            "slot range exceeds capacity"
        );
        match self.ptr {
            // SAFETY: start is within the held block.
            Some(ptr) => unsafe { ptr.add(start * self.alloc.type_size()) },
            None => {
                let addr = core::ptr::without_provenance_mut::<u8>(self.alloc.type_align());
                // SAFETY: alignments are non-zero.
                unsafe { NonNull::new_unchecked(addr) }
            }
        }
    }

    /// Default-constructs slots `start..start + count`
    ///
    /// # Safety
    /// The slots must lie inside the block and hold no live elements.
    pub unsafe fn construct(&mut self, start: usize, count: usize) -> AllocResult<()> {
        let dst = self.slots(start, count);
        // SAFETY: forwarded caller contract
        unsafe { self.alloc.construct(dst, count) }
    }

    /// # Safety
    /// Slots `start..start + count` must hold live elements.
    pub unsafe fn destroy(&mut self, start: usize, count: usize) {
        let ptr = self.slots(start, count);
        // SAFETY: forwarded caller contract
        unsafe { self.alloc.destroy(ptr, count) }
    }

    /// # Safety
    /// Slots `0..live` must hold live elements and no others may.
    pub unsafe fn reallocate(&mut self, live: usize, new_capacity: usize) -> AllocResult<NonNull<u8>> {
        let align = self.align;
        // SAFETY: forwarded caller contract
        unsafe { self.reallocate_aligned(live, new_capacity, align) }
    }

    /// # Safety
    /// Same as [`reallocate`](Self::reallocate).
    pub unsafe fn reallocate_aligned(
        &mut self,
        live: usize,
        new_capacity: usize,
        align: usize,
    ) -> AllocResult<NonNull<u8>> {
        debug_assert!(live <= self.capacity, "more live elements than capacity");

        let Some(old) = self.ptr else {
            return self.allocate_aligned(new_capacity, align);
        };

        let new_ptr = self.alloc.allocate_aligned(new_capacity, align)?;
        let kept = live.min(new_capacity);

        // SAFETY: old holds `live` elements; new_ptr is a fresh block.
        unsafe {
            self.alloc.move_to(new_ptr, old, kept);
            if live > kept {
                self.alloc
                    .destroy(old.add(kept * self.alloc.type_size()), live - kept);
            }
            self.alloc.deallocate_aligned(old, self.capacity, self.align);
        }

        self.install(new_ptr, new_capacity, align);
        Ok(new_ptr)
    }

    /// Releases the held block without dropping any element
    pub fn deallocate(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            // SAFETY: ptr/capacity/align describe the block we allocated.
            unsafe { self.alloc.deallocate_aligned(ptr, self.capacity, self.align) };
        }
        self.capacity = 0;
        self.align = self.alloc.type_align();
    }

    /// Releases a block that was acquired with `allocate_aligned(_, align)`
    pub fn deallocate_aligned(&mut self, align: usize) {
        debug_assert_eq!(
            align.max(self.alloc.type_align()),
            self.align,
            "deallocating with a different alignment than allocated"
        );
        self.deallocate();
    }
}

impl<A: Allocator> Drop for ErasedResourceBase<A> {
    fn drop(&mut self) {
        self.deallocate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{SystemAllocator, TrackedAllocator};

    type Tracked = TrackedAllocator<SystemAllocator>;

    fn tracker() -> &'static Tracked {
        Box::leak(Box::new(Tracked::new(SystemAllocator::new())))
    }

    fn base<T>(tracker: &'static Tracked) -> ResourceBase<T, &'static Tracked, DefaultFactory<T>> {
        ResourceBase::new(TypedAllocator::new(tracker, DefaultFactory::new()))
    }

    #[test]
    fn holds_block_iff_capacity() {
        let tracker = tracker();
        let mut res = base::<u32>(tracker);
        assert!(!res.is_allocated());

        res.allocate(0).unwrap();
        assert!(!res.is_allocated());
        assert_eq!(res.capacity(), 0);

        res.allocate(8).unwrap();
        assert!(res.is_allocated());
        assert_eq!(tracker.allocated_bytes(), 32);

        res.deallocate();
        assert!(!res.is_allocated());
        assert!(!tracker.has_leaks());
    }

    #[test]
    fn second_allocate_is_refused() {
        let mut res = base::<u8>(tracker());
        res.allocate(4).unwrap();
        let err = res.allocate(4).unwrap_err();
        assert_eq!(err.code(), "MEM:SYSTEM:STATE");
    }

    #[test]
    fn reallocate_moves_live_prefix() {
        let tracker = tracker();
        let mut res = base::<String>(tracker);
        res.allocate(2).unwrap();

        unsafe {
            res.construct_with(0, 2, |i| format!("s{i}"));
            let ptr = res.reallocate(2, 6).unwrap();
            assert_eq!(res.capacity(), 6);
            assert_eq!(ptr.add(1).as_ref(), "s1");

            res.construct(2, 1);
            assert!(ptr.add(2).as_ref().is_empty());
            res.destroy(0, 3);
        }

        drop(res);
        assert!(!tracker.has_leaks());
    }

    #[test]
    fn reallocate_to_zero_releases() {
        let tracker = tracker();
        let mut res = base::<String>(tracker);
        res.allocate(3).unwrap();

        unsafe {
            res.construct_with(0, 3, |_| String::from("x"));
            res.reallocate(3, 0).unwrap();
        }
        assert!(!res.is_allocated());
        assert!(!tracker.has_leaks());
    }

    #[test]
    fn aligned_round_trip() {
        let tracker = tracker();
        let mut res = base::<u16>(tracker);

        let ptr = res.allocate_aligned(10, 256).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 256, 0);
        assert_eq!(res.align(), 256);

        let ptr = unsafe { res.reallocate(0, 20) }.unwrap();
        assert_eq!(ptr.as_ptr() as usize % 256, 0);

        res.deallocate_aligned(256);
        assert!(!tracker.has_leaks());
    }

    #[test]
    fn drop_releases_without_destroying() {
        let tracker = tracker();
        {
            let mut res = base::<u64>(tracker);
            res.allocate(16).unwrap();
            unsafe { res.construct(0, 16) };
        }
        assert!(!tracker.has_leaks());
    }

    #[test]
    fn erased_rebind_only_when_empty() {
        let tracker = tracker();
        let mut res = ErasedResourceBase::new(tracker, ErasedFactory::of_clone::<String>());

        res.allocate(2).unwrap();
        assert!(res.set_factory(ErasedFactory::of::<u64>()).is_err());
        assert!(res.set_allocator(tracker).is_err());

        res.deallocate();
        res.set_factory(ErasedFactory::of_bitwise::<u64>()).unwrap();
        assert!(res.get_factory().is::<u64>());

        res.allocate(4).unwrap();
        assert_eq!(tracker.allocated_bytes(), 32);
        unsafe {
            res.construct(0, 4).unwrap();
            res.reallocate(4, 8).unwrap();
            res.destroy(0, 4);
        }
        drop(res);
        assert!(!tracker.has_leaks());
    }

    #[test]
    fn erased_empty_slots_respect_element_alignment() {
        #[derive(Clone, Default)]
        #[repr(align(64))]
        #[allow(dead_code)]
        struct Line(u64);

        let mut res = ErasedResourceBase::new(SystemAllocator::new(), ErasedFactory::of_clone::<Line>());
        assert_eq!(res.slots(0, 0).as_ptr() as usize % 64, 0);
        unsafe {
            res.construct(0, 0).unwrap();
            res.destroy(0, 0);
        }
        assert!(!res.is_allocated());
    }

    #[test]
    fn erased_reallocate_keeps_strings() {
        let tracker = tracker();
        let mut res = ErasedResourceBase::new(tracker, ErasedFactory::of_clone::<String>());
        res.allocate(1).unwrap();

        unsafe {
            res.construct(0, 1).unwrap();
            res.as_ptr().unwrap().cast::<String>().as_mut().push_str("kept");

            let ptr = res.reallocate(1, 4).unwrap();
            assert_eq!(ptr.cast::<String>().as_ref(), "kept");
            res.destroy(0, 1);
        }
        drop(res);
        assert!(!tracker.has_leaks());
    }
}
