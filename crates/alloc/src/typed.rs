//! Typed allocator: the allocator and factory capabilities fused for one
//! element type
//!
//! [`TypedAllocator`] is the operation surface containers program against.
//! It is a single generic type; when both capabilities are zero-sized it is
//! zero-sized too (see [`TypedAllocator::IS_STATELESS`]), otherwise it carries
//! exactly the state of the capabilities it holds.
//!
//! Counts are in elements, never bytes. Alignment arguments are raised to at
//! least `align_of::<T>()`. A zero count yields a dangling, well-aligned
//! pointer that never reaches the allocator's backing storage.

use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::allocator::{AllocResult, Allocator, BlockGuard, PolymorphicAllocator, array_layout};
use crate::factory::{DefaultFactory, Factory, Rebind};
use crate::storage::{AllocatorStorage, FactoryStorage};

/// Allocation plus construction for elements of type `T`
///
/// # Examples
///
/// ```
/// use nebula_alloc::allocator::SystemAllocator;
/// use nebula_alloc::factory::DefaultFactory;
/// use nebula_alloc::typed::TypedAllocator;
///
/// let alloc = TypedAllocator::<String, SystemAllocator, DefaultFactory<String>>::default();
/// assert_eq!(size_of_val(&alloc), 0);
///
/// let ptr = alloc.allocate_and_fill(3, &String::from("hi"))?;
/// unsafe {
///     assert_eq!(ptr.add(2).as_ref(), "hi");
///     alloc.destroy_and_deallocate(ptr, 3);
/// }
/// # Ok::<(), nebula_alloc::MemoryError>(())
/// ```
pub struct TypedAllocator<T, A = PolymorphicAllocator, F = DefaultFactory<T>> {
    alloc: AllocatorStorage<A>,
    factory: FactoryStorage<F>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, A, F> TypedAllocator<T, A, F>
where
    A: Allocator,
    F: Factory<Item = T>,
{
    /// Both capabilities are stateless; the typed allocator occupies no bytes
    pub const IS_STATELESS: bool =
        AllocatorStorage::<A>::IS_STATELESS && FactoryStorage::<F>::IS_STATELESS;

    /// `reallocate_and_construct` cannot fault
    pub const REALLOCATE_INFALLIBLE: bool = F::INFALLIBLE_MOVE && F::INFALLIBLE_DEFAULT;

    /// `reallocate_and_fill` cannot fault
    pub const REALLOCATE_FILL_INFALLIBLE: bool = F::INFALLIBLE_MOVE && F::INFALLIBLE_COPY;

    pub const fn new(alloc: A, factory: F) -> Self {
        Self::from_storages(AllocatorStorage::new(alloc), FactoryStorage::new(factory))
    }

    pub const fn from_storages(alloc: AllocatorStorage<A>, factory: FactoryStorage<F>) -> Self {
        Self {
            alloc,
            factory,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn allocator(&self) -> &A {
        self.alloc.get()
    }

    #[inline]
    pub fn factory(&self) -> &F {
        self.factory.get()
    }

    pub fn allocator_storage(&self) -> &AllocatorStorage<A> {
        &self.alloc
    }

    pub fn factory_storage(&self) -> &FactoryStorage<F> {
        &self.factory
    }

    /// Splits into the two capability storages
    pub fn into_storages(self) -> (AllocatorStorage<A>, FactoryStorage<F>) {
        (self.alloc, self.factory)
    }

    /// Layout of `count` elements at `align` (raised to `align_of::<T>()`)
    pub fn layout(count: usize, align: usize) -> AllocResult<Layout> {
        array_layout(size_of::<T>(), align.max(align_of::<T>()), count)
    }

    /// # Safety
    /// `count`/`align` must be values for which [`layout`](Self::layout)
    /// previously succeeded.
    #[inline]
    unsafe fn layout_unchecked(count: usize, align: usize) -> Layout {
        // SAFETY: the same computation succeeded when the block was allocated.
        unsafe {
            Layout::from_size_align_unchecked(
                size_of::<T>().unchecked_mul(count),
                align.max(align_of::<T>()),
            )
        }
    }

    // ========================================================================
    // Raw storage
    // ========================================================================

    /// Reserves storage for `count` elements
    pub fn allocate(&self, count: usize) -> AllocResult<NonNull<T>> {
        self.allocate_aligned(count, align_of::<T>())
    }

    /// Reserves storage for `count` elements at `align`
    pub fn allocate_aligned(&self, count: usize, align: usize) -> AllocResult<NonNull<T>> {
        let layout = Self::layout(count, align)?;
        // SAFETY: layout was validated by array_layout.
        let block = unsafe { self.alloc.allocate(layout)? };
        Ok(block.cast())
    }

    /// Releases storage for `count` elements
    ///
    /// # Safety
    /// `ptr` must come from `allocate(count)` on an equivalent allocator and
    /// hold no live elements.
    pub unsafe fn deallocate(&self, ptr: NonNull<T>, count: usize) {
        // SAFETY: forwarded caller contract
        unsafe { self.deallocate_aligned(ptr, count, align_of::<T>()) }
    }

    /// Releases storage obtained from `allocate_aligned(count, align)`
    ///
    /// # Safety
    /// Same as [`deallocate`](Self::deallocate), with matching `align`.
    pub unsafe fn deallocate_aligned(&self, ptr: NonNull<T>, count: usize, align: usize) {
        // SAFETY: the layout succeeded at allocation time (caller contract).
        unsafe {
            let layout = Self::layout_unchecked(count, align);
            self.alloc.deallocate(ptr.cast(), layout);
        }
    }

    // ========================================================================
    // Element lifecycle
    // ========================================================================

    /// Builds `init(i)` into slot `i` of `0..count`
    ///
    /// # Safety
    /// See [`Factory::construct_with`].
    pub unsafe fn construct_with<G>(&self, ptr: NonNull<T>, count: usize, init: G)
    where
        G: FnMut(usize) -> T,
    {
        // SAFETY: forwarded caller contract
        unsafe { self.factory.construct_with(ptr, count, init) }
    }

    /// Fallible element construction; the built prefix is dropped on `Err`
    ///
    /// # Safety
    /// See [`Factory::try_construct_with`].
    pub unsafe fn try_construct_with<G, E>(&self, ptr: NonNull<T>, count: usize, init: G) -> Result<(), E>
    where
        G: FnMut(usize) -> Result<T, E>,
    {
        // SAFETY: forwarded caller contract
        unsafe { self.factory.try_construct_with(ptr, count, init) }
    }

    /// # Safety
    /// See [`Factory::construct_default`].
    pub unsafe fn construct(&self, ptr: NonNull<T>, count: usize)
    where
        T: Default,
    {
        // SAFETY: forwarded caller contract
        unsafe { self.factory.construct_default(ptr, count) }
    }

    /// # Safety
    /// See [`Factory::construct_fill`].
    pub unsafe fn construct_fill(&self, ptr: NonNull<T>, count: usize, value: &T)
    where
        T: Clone,
    {
        // SAFETY: forwarded caller contract
        unsafe { self.factory.construct_fill(ptr, count, value) }
    }

    /// Copy-constructs `count` elements from `src` into `dst`
    ///
    /// # Safety
    /// See [`Factory::copy_to`].
    pub unsafe fn copy(&self, dst: NonNull<T>, src: NonNull<T>, count: usize)
    where
        T: Clone,
    {
        // SAFETY: forwarded caller contract
        unsafe { self.factory.copy_to(dst, src, count) }
    }

    /// Relocates `count` elements from `src` into `dst`
    ///
    /// # Safety
    /// See [`Factory::move_to`].
    pub unsafe fn move_to(&self, dst: NonNull<T>, src: NonNull<T>, count: usize) {
        // SAFETY: forwarded caller contract
        unsafe { self.factory.move_to(dst, src, count) }
    }

    /// # Safety
    /// See [`Factory::destroy`].
    pub unsafe fn destroy(&self, ptr: NonNull<T>, count: usize) {
        // SAFETY: forwarded caller contract
        unsafe { self.factory.destroy(ptr, count) }
    }

    // ========================================================================
    // Fused operations
    // ========================================================================

    /// Allocates `count` elements at `align` and builds them with `init`
    ///
    /// A construction fault releases the block before propagating.
    pub fn allocate_aligned_and_construct_with<G>(
        &self,
        count: usize,
        align: usize,
        init: G,
    ) -> AllocResult<NonNull<T>>
    where
        G: FnMut(usize) -> T,
    {
        // SAFETY: the block is fresh and valid for count writes.
        self.allocate_and_build(count, align, |block| unsafe {
            self.factory.construct_with(block, count, init);
        })
    }

    /// Allocates `count` slots at `align` and runs `build` on the fresh block
    ///
    /// `build` must initialize all `count` slots or leave none initialized.
    /// The block is released if `build` unwinds.
    fn allocate_and_build(
        &self,
        count: usize,
        align: usize,
        build: impl FnOnce(NonNull<T>),
    ) -> AllocResult<NonNull<T>> {
        let layout = Self::layout(count, align)?;
        // SAFETY: layout validated above.
        let block = unsafe { self.alloc.allocate(layout)? };
        // SAFETY: block was just allocated by this allocator with layout.
        let guard = unsafe { BlockGuard::new(self.alloc.get(), block.cast(), layout) };
        build(block.cast());
        Ok(guard.release().cast())
    }

    /// Allocates `count` elements and builds them with `init`
    pub fn allocate_and_construct_with<G>(&self, count: usize, init: G) -> AllocResult<NonNull<T>>
    where
        G: FnMut(usize) -> T,
    {
        self.allocate_aligned_and_construct_with(count, align_of::<T>(), init)
    }

    /// Allocates and default-constructs `count` elements
    pub fn allocate_and_construct(&self, count: usize) -> AllocResult<NonNull<T>>
    where
        T: Default,
    {
        self.allocate_and_construct_aligned(count, align_of::<T>())
    }

    /// Allocates and default-constructs `count` elements at `align`
    pub fn allocate_and_construct_aligned(&self, count: usize, align: usize) -> AllocResult<NonNull<T>>
    where
        T: Default,
    {
        // SAFETY: the block is fresh and valid for count writes.
        self.allocate_and_build(count, align, |block| unsafe {
            self.factory.construct_default(block, count);
        })
    }

    /// Allocates `count` clones of `value`
    pub fn allocate_and_fill(&self, count: usize, value: &T) -> AllocResult<NonNull<T>>
    where
        T: Clone,
    {
        // SAFETY: the block is fresh and valid for count writes.
        self.allocate_and_build(count, align_of::<T>(), |block| unsafe {
            self.factory.construct_fill(block, count, value);
        })
    }

    /// Drops `count` elements and releases their storage
    ///
    /// # Safety
    /// `ptr` must come from `allocate(count)` on an equivalent allocator and
    /// hold `count` live elements.
    pub unsafe fn destroy_and_deallocate(&self, ptr: NonNull<T>, count: usize) {
        // SAFETY: forwarded caller contract
        unsafe { self.destroy_and_deallocate_aligned(ptr, count, align_of::<T>()) }
    }

    /// # Safety
    /// Same as [`destroy_and_deallocate`](Self::destroy_and_deallocate), with
    /// the allocation's `align`.
    pub unsafe fn destroy_and_deallocate_aligned(&self, ptr: NonNull<T>, count: usize, align: usize) {
        // SAFETY: forwarded caller contract
        unsafe {
            self.factory.destroy(ptr, count);
            self.deallocate_aligned(ptr, count, align);
        }
    }

    // ========================================================================
    // Reallocation
    // ========================================================================

    /// Moves `old_count` live elements into a block of `new_count`
    ///
    /// The first `min(old_count, new_count)` elements are relocated, any
    /// truncated tail is dropped, and the old block is released. Slots past
    /// `old_count` in the new block are uninitialized. On allocation failure
    /// the old block is untouched.
    ///
    /// # Safety
    /// `ptr` must come from `allocate(old_count)` on an equivalent allocator
    /// and hold `old_count` live elements. It is invalid after success.
    pub unsafe fn reallocate(&self, ptr: NonNull<T>, old_count: usize, new_count: usize) -> AllocResult<NonNull<T>> {
        // SAFETY: forwarded caller contract
        unsafe { self.reallocate_aligned(ptr, old_count, new_count, align_of::<T>()) }
    }

    /// [`reallocate`](Self::reallocate) for a block allocated at `align`
    ///
    /// # Safety
    /// Same as `reallocate`, with the allocation's `align`.
    pub unsafe fn reallocate_aligned(
        &self,
        ptr: NonNull<T>,
        old_count: usize,
        new_count: usize,
        align: usize,
    ) -> AllocResult<NonNull<T>> {
        let new_ptr = self.allocate_aligned(new_count, align)?;
        let kept = old_count.min(new_count);

        // SAFETY: ptr holds old_count live elements; new_ptr is a distinct
        // fresh block of new_count slots.
        unsafe {
            self.factory.move_to(new_ptr, ptr, kept);
            if old_count > kept {
                self.factory.destroy(ptr.add(kept), old_count - kept);
            }
            self.deallocate_aligned(ptr, old_count, align);
        }
        Ok(new_ptr)
    }

    /// Grows (or shrinks) a block and builds the new tail with `init`
    ///
    /// `init` receives the index of each new slot (`old_count..new_count`).
    /// The tail is built in the new block before anything leaves the old one,
    /// so a construction fault drops the partial tail, releases the new block
    /// and leaves `ptr` and its elements untouched.
    ///
    /// # Safety
    /// Same as [`reallocate_aligned`](Self::reallocate_aligned).
    pub unsafe fn reallocate_aligned_and_construct_with<G>(
        &self,
        ptr: NonNull<T>,
        old_count: usize,
        new_count: usize,
        align: usize,
        mut init: G,
    ) -> AllocResult<NonNull<T>>
    where
        G: FnMut(usize) -> T,
    {
        // SAFETY: forwarded caller contract; the tail slots are writable.
        unsafe {
            self.reallocate_and_build_tail(ptr, old_count, new_count, align, |tail, len| {
                self.factory.construct_with(tail, len, |i| init(old_count + i));
            })
        }
    }

    /// Grows into a fresh block whose tail `build` fills before the prefix moves
    ///
    /// `build` receives the first tail slot and the tail length, and must
    /// initialize every tail slot or leave none initialized.
    ///
    /// # Safety
    /// Same as [`reallocate_aligned`](Self::reallocate_aligned).
    unsafe fn reallocate_and_build_tail(
        &self,
        ptr: NonNull<T>,
        old_count: usize,
        new_count: usize,
        align: usize,
        build: impl FnOnce(NonNull<T>, usize),
    ) -> AllocResult<NonNull<T>> {
        if new_count <= old_count {
            // SAFETY: forwarded caller contract
            return unsafe { self.reallocate_aligned(ptr, old_count, new_count, align) };
        }

        let block = self.allocate_and_build(new_count, align, |block| {
            // SAFETY: old_count < new_count, so the tail lies inside the block.
            build(unsafe { block.add(old_count) }, new_count - old_count);
        })?;

        // SAFETY: prefix slots are untouched; relocation cannot fault.
        unsafe {
            self.factory.move_to(block, ptr, old_count);
            self.deallocate_aligned(ptr, old_count, align);
        }
        Ok(block)
    }

    /// Reallocates and default-constructs the grown tail
    ///
    /// Fault-free exactly when [`REALLOCATE_INFALLIBLE`](Self::REALLOCATE_INFALLIBLE).
    ///
    /// # Safety
    /// Same as [`reallocate`](Self::reallocate).
    pub unsafe fn reallocate_and_construct(
        &self,
        ptr: NonNull<T>,
        old_count: usize,
        new_count: usize,
    ) -> AllocResult<NonNull<T>>
    where
        T: Default,
    {
        // SAFETY: forwarded caller contract
        unsafe { self.reallocate_and_construct_aligned(ptr, old_count, new_count, align_of::<T>()) }
    }

    /// # Safety
    /// Same as [`reallocate_aligned`](Self::reallocate_aligned).
    pub unsafe fn reallocate_and_construct_aligned(
        &self,
        ptr: NonNull<T>,
        old_count: usize,
        new_count: usize,
        align: usize,
    ) -> AllocResult<NonNull<T>>
    where
        T: Default,
    {
        // SAFETY: forwarded caller contract; the tail slots are writable.
        unsafe {
            self.reallocate_and_build_tail(ptr, old_count, new_count, align, |tail, len| {
                self.factory.construct_default(tail, len);
            })
        }
    }

    /// Reallocates and fills the grown tail with clones of `value`
    ///
    /// # Safety
    /// Same as [`reallocate`](Self::reallocate).
    pub unsafe fn reallocate_and_fill(
        &self,
        ptr: NonNull<T>,
        old_count: usize,
        new_count: usize,
        value: &T,
    ) -> AllocResult<NonNull<T>>
    where
        T: Clone,
    {
        // SAFETY: forwarded caller contract; the tail slots are writable.
        unsafe {
            self.reallocate_and_build_tail(ptr, old_count, new_count, align_of::<T>(), |tail, len| {
                self.factory.construct_fill(tail, len, value);
            })
        }
    }

    // ========================================================================
    // Retargeting
    // ========================================================================

    /// Same allocator, factory rebound to element type `U`
    pub fn retarget<U>(&self) -> TypedAllocator<U, A, F::Output>
    where
        A: Clone,
        F: Rebind<U>,
    {
        TypedAllocator::new(self.alloc.get().clone(), self.factory.rebind())
    }
}

impl<T, A: Allocator + Default, F: Factory<Item = T> + Default> Default for TypedAllocator<T, A, F> {
    fn default() -> Self {
        Self::new(A::default(), F::default())
    }
}

impl<T, A: Clone, F: Clone> Clone for TypedAllocator<T, A, F> {
    fn clone(&self) -> Self {
        Self {
            alloc: self.alloc.clone(),
            factory: self.factory.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, A: Copy, F: Copy> Copy for TypedAllocator<T, A, F> {}

impl<T, A: fmt::Debug, F: fmt::Debug> fmt::Debug for TypedAllocator<T, A, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedAllocator")
            .field("element", &core::any::type_name::<T>())
            .field("allocator", &self.alloc)
            .field("factory", &self.factory)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::rc::Rc;

    use super::*;
    use crate::allocator::{SystemAllocator, TrackedAllocator};
    use crate::factory::BitwiseFactory;

    type Tracked = TrackedAllocator<SystemAllocator>;

    fn leak_tracker() -> &'static Tracked {
        Box::leak(Box::new(Tracked::new(SystemAllocator::new())))
    }

    fn typed<T>(tracker: &'static Tracked) -> TypedAllocator<T, &'static Tracked, DefaultFactory<T>> {
        TypedAllocator::new(tracker, DefaultFactory::new())
    }

    #[derive(Clone)]
    struct DropCounter(Rc<Cell<usize>>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn stateless_typed_allocator_is_zero_sized() {
        type Stateless = TypedAllocator<u64, SystemAllocator, DefaultFactory<u64>>;
        assert!(Stateless::IS_STATELESS);
        assert_eq!(size_of::<Stateless>(), 0);

        type Stateful = TypedAllocator<u64, PolymorphicAllocator, DefaultFactory<u64>>;
        assert!(!Stateful::IS_STATELESS);
        assert_eq!(size_of::<Stateful>(), size_of::<PolymorphicAllocator>());
    }

    #[test]
    fn reallocate_flags_are_conjunctions() {
        assert!(!TypedAllocator::<String, SystemAllocator, DefaultFactory<String>>::REALLOCATE_INFALLIBLE);
        assert!(TypedAllocator::<u32, SystemAllocator, BitwiseFactory<u32>>::REALLOCATE_FILL_INFALLIBLE);
        assert!(!TypedAllocator::<u32, SystemAllocator, BitwiseFactory<u32>>::REALLOCATE_INFALLIBLE);
    }

    #[test]
    fn allocate_and_construct_round_trip() {
        let tracker = leak_tracker();
        let alloc = typed::<String>(tracker);

        let ptr = alloc.allocate_and_construct_with(4, |i| i.to_string()).unwrap();
        unsafe {
            assert_eq!(ptr.add(3).as_ref(), "3");
            alloc.destroy_and_deallocate(ptr, 4);
        }
        assert!(!tracker.has_leaks());
        assert_eq!(tracker.allocated_bytes(), 0);
    }

    #[test]
    fn zero_count_never_reaches_the_heap() {
        let alloc = TypedAllocator::<u64, SystemAllocator, DefaultFactory<u64>>::default();
        let ptr = alloc.allocate(0).unwrap();
        assert_eq!(ptr.as_ptr() as usize % align_of::<u64>(), 0);
        unsafe { alloc.deallocate(ptr, 0) };
    }

    #[test]
    fn aligned_allocation_honours_alignment() {
        let tracker = leak_tracker();
        let alloc = typed::<u8>(tracker);

        let ptr = alloc.allocate_aligned(10, 64).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 64, 0);
        unsafe { alloc.deallocate_aligned(ptr, 10, 64) };
        assert!(!tracker.has_leaks());
    }

    #[test]
    fn overflowing_count_is_an_error() {
        let alloc = TypedAllocator::<u64, SystemAllocator, DefaultFactory<u64>>::default();
        let err = alloc.allocate(usize::MAX).unwrap_err();
        assert_eq!(err.code(), "MEM:ALLOC:OVERFLOW");
    }

    #[test]
    fn construction_fault_releases_block() {
        let tracker = leak_tracker();
        let alloc = typed::<DropCounter>(tracker);
        let drops = Rc::new(Cell::new(0));

        let result = catch_unwind(AssertUnwindSafe(|| {
            alloc.allocate_and_construct_with(4, |i| {
                assert!(i < 2, "fault");
                DropCounter(drops.clone())
            })
        }));

        assert!(result.is_err());
        assert_eq!(drops.get(), 2);
        assert!(!tracker.has_leaks());
    }

    #[test]
    fn reallocate_preserves_prefix_and_drops_tail() {
        let tracker = leak_tracker();
        let alloc = typed::<DropCounter>(tracker);
        let drops = Rc::new(Cell::new(0));

        let ptr = alloc
            .allocate_and_construct_with(5, |_| DropCounter(drops.clone()))
            .unwrap();
        let ptr = unsafe { alloc.reallocate(ptr, 5, 2) }.unwrap();
        assert_eq!(drops.get(), 3);

        unsafe { alloc.destroy_and_deallocate(ptr, 2) };
        assert_eq!(drops.get(), 5);
        assert!(!tracker.has_leaks());
    }

    #[test]
    fn reallocate_and_construct_builds_tail() {
        let tracker = leak_tracker();
        let alloc = typed::<String>(tracker);

        let ptr = alloc.allocate_and_construct_with(2, |i| format!("v{i}")).unwrap();
        let ptr = unsafe { alloc.reallocate_and_construct(ptr, 2, 4) }.unwrap();

        unsafe {
            let values = core::slice::from_raw_parts(ptr.as_ptr(), 4);
            assert_eq!(values, ["v0", "v1", "", ""]);
            alloc.destroy_and_deallocate(ptr, 4);
        }
        assert!(!tracker.has_leaks());
    }

    #[test]
    fn reallocate_tail_fault_leaves_old_block_intact() {
        let tracker = leak_tracker();
        let alloc = typed::<String>(tracker);

        let ptr = alloc.allocate_and_construct_with(3, |i| format!("v{i}")).unwrap();
        let result = catch_unwind(AssertUnwindSafe(|| unsafe {
            alloc.reallocate_aligned_and_construct_with(ptr, 3, 6, align_of::<String>(), |i| {
                assert!(i < 4, "fault");
                String::from("new")
            })
        }));
        assert!(result.is_err());

        unsafe {
            let values = core::slice::from_raw_parts(ptr.as_ptr(), 3);
            assert_eq!(values, ["v0", "v1", "v2"]);
            alloc.destroy_and_deallocate(ptr, 3);
        }
        assert!(!tracker.has_leaks());
    }

    #[test]
    fn copy_then_destroy_both() {
        let alloc = TypedAllocator::<Vec<u8>, SystemAllocator, DefaultFactory<Vec<u8>>>::default();

        let src = alloc.allocate_and_fill(3, &vec![1, 2, 3]).unwrap();
        let dst = alloc.allocate(3).unwrap();
        unsafe {
            alloc.copy(dst, src, 3);
            assert_eq!(dst.add(1).as_ref(), &[1, 2, 3]);
            alloc.destroy_and_deallocate(src, 3);
            alloc.destroy_and_deallocate(dst, 3);
        }
    }

    #[test]
    fn retarget_shares_allocator() {
        let tracker = leak_tracker();
        let strings = typed::<String>(tracker);
        let numbers: TypedAllocator<u32, _, DefaultFactory<u32>> = strings.retarget();

        assert!(core::ptr::eq(*numbers.allocator(), tracker));
        let ptr = numbers.allocate_and_construct(8).unwrap();
        assert_eq!(tracker.allocation_count(), 1);
        unsafe { numbers.destroy_and_deallocate(ptr, 8) };
        assert!(!tracker.has_leaks());
    }

    #[test]
    fn polymorphic_default_follows_thread_override() {
        let tracker = leak_tracker();
        let alloc = crate::allocator::with_thread_default(tracker, TypedAllocator::<u16>::default);

        let ptr = alloc.allocate(16).unwrap();
        assert_eq!(tracker.allocated_bytes(), 32);
        unsafe { alloc.deallocate(ptr, 16) };
        assert!(!tracker.has_leaks());
    }
}
