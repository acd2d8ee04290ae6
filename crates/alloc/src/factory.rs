//! Factory capability: constructing and destroying objects in raw storage
//!
//! A [`Factory`] never obtains memory; it only builds values into storage
//! someone else reserved, tears them down, and moves or copies them between
//! blocks. Its associated constants describe which of those steps cannot
//! fail, so composed operations can report their own failure contract at
//! compile time (see `TypedAllocator::REALLOCATE_INFALLIBLE`).
//!
//! Rust moves are bitwise relocations, so every factory relocates with
//! `copy_nonoverlapping` and treats the source range as uninitialized
//! afterwards.
//!
//! # Construction faults
//!
//! A fault is a panic from `Default`/`Clone`/an initializer closure, or an
//! `Err` from [`Factory::try_construct_with`]. Either way the elements already
//! built by that call are dropped before the fault propagates, and the target
//! range is left uninitialized.

use core::any::TypeId;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::{self, NonNull};

use crate::allocator::array_layout;
use crate::error::{MemoryError, MemoryResult};

// ============================================================================
// Partial-construction guard
// ============================================================================

/// Drops the first `len` elements at `base` unless committed
struct PartialInit<T> {
    base: NonNull<T>,
    len: usize,
}

impl<T> PartialInit<T> {
    fn commit(mut self) {
        self.len = 0;
    }
}

impl<T> Drop for PartialInit<T> {
    fn drop(&mut self) {
        // SAFETY: exactly `len` leading elements were written and not yet
        // handed to the caller.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.base.as_ptr(), self.len));
        }
    }
}

// ============================================================================
// Factory trait
// ============================================================================

/// Object construction capability for one element type
///
/// # Safety
///
/// Implementors overriding the provided methods must ensure that:
/// - a construction method that returns normally has initialized all `count`
///   elements
/// - a construction method that faults leaves no element of its range
///   initialized
/// - `move_to` leaves `dst` initialized and `src` logically uninitialized
/// - the associated flags are truthful: a flag claiming a step cannot fail
///   must hold for every value of `Item`
pub unsafe trait Factory {
    /// Element type this factory builds
    type Item;

    /// `construct_default` cannot fault
    const INFALLIBLE_DEFAULT: bool;
    /// `copy_to` and `construct_fill` cannot fault
    const INFALLIBLE_COPY: bool;
    /// `move_to` cannot fault
    const INFALLIBLE_MOVE: bool = true;
    /// Copying an element is a raw byte copy
    const TRIVIAL_COPY: bool;
    /// Relocating an element is a raw byte copy followed by abandoning the source
    const TRIVIAL_RELOCATE: bool = true;

    /// Writes `init(i)` into slot `i` for every `i` in `0..count`
    ///
    /// # Safety
    /// `dst` must be valid for writes of `count` elements and contain no live
    /// values that need dropping.
    unsafe fn construct_with<G>(&self, dst: NonNull<Self::Item>, count: usize, mut init: G)
    where
        G: FnMut(usize) -> Self::Item,
    {
        let mut guard = PartialInit { base: dst, len: 0 };
        for i in 0..count {
            // SAFETY: i < count, so the slot lies inside the caller's range.
            unsafe { dst.add(i).write(init(i)) };
            guard.len = i + 1;
        }
        guard.commit();
    }

    /// Fallible variant of [`construct_with`](Self::construct_with)
    ///
    /// On `Err` every element built by this call has been dropped.
    ///
    /// # Safety
    /// Same as `construct_with`.
    unsafe fn try_construct_with<G, E>(
        &self,
        dst: NonNull<Self::Item>,
        count: usize,
        mut init: G,
    ) -> Result<(), E>
    where
        G: FnMut(usize) -> Result<Self::Item, E>,
    {
        let mut guard = PartialInit { base: dst, len: 0 };
        for i in 0..count {
            let value = init(i)?;
            // SAFETY: i < count, so the slot lies inside the caller's range.
            unsafe { dst.add(i).write(value) };
            guard.len = i + 1;
        }
        guard.commit();
        Ok(())
    }

    /// Default-constructs `count` elements
    ///
    /// # Safety
    /// Same as `construct_with`.
    unsafe fn construct_default(&self, dst: NonNull<Self::Item>, count: usize)
    where
        Self::Item: Default,
    {
        // SAFETY: forwarded caller contract
        unsafe { self.construct_with(dst, count, |_| Default::default()) }
    }

    /// Constructs `count` clones of `value`
    ///
    /// # Safety
    /// Same as `construct_with`.
    unsafe fn construct_fill(&self, dst: NonNull<Self::Item>, count: usize, value: &Self::Item)
    where
        Self::Item: Clone,
    {
        // SAFETY: forwarded caller contract
        unsafe { self.construct_with(dst, count, |_| value.clone()) }
    }

    /// Copy-constructs `count` elements from `src` into `dst`
    ///
    /// # Safety
    /// - `src` must hold `count` initialized elements
    /// - `dst` must satisfy the `construct_with` contract
    /// - the ranges must not overlap
    unsafe fn copy_to(&self, dst: NonNull<Self::Item>, src: NonNull<Self::Item>, count: usize)
    where
        Self::Item: Clone,
    {
        // SAFETY: i < count and src holds count initialized elements.
        unsafe { self.construct_with(dst, count, |i| (*src.add(i).as_ptr()).clone()) }
    }

    /// Relocates `count` elements from `src` to `dst`
    ///
    /// Afterwards `src` is uninitialized and must not be dropped.
    ///
    /// # Safety
    /// - `src` must hold `count` initialized elements
    /// - `dst` must be valid for `count` writes
    /// - the ranges must not overlap
    unsafe fn move_to(&self, dst: NonNull<Self::Item>, src: NonNull<Self::Item>, count: usize) {
        // SAFETY: caller contract; a Rust move is a bitwise copy.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), count) }
    }

    /// Drops `count` elements in place
    ///
    /// # Safety
    /// `ptr` must hold `count` initialized elements, which are uninitialized
    /// afterwards.
    unsafe fn destroy(&self, ptr: NonNull<Self::Item>, count: usize) {
        // SAFETY: caller contract
        unsafe { ptr::drop_in_place(ptr::slice_from_raw_parts_mut(ptr.as_ptr(), count)) }
    }
}

/// Retargeting of a factory to another element type
///
/// Lets a container built for `T` derive, from the same factory, the one it
/// needs for its internal node type.
pub trait Rebind<U> {
    /// Factory for `U`
    type Output: Factory<Item = U>;

    /// Builds the retargeted factory
    fn rebind(&self) -> Self::Output;
}

// ============================================================================
// Provided factories
// ============================================================================

/// Factory that uses the element type's own `Default`, `Clone` and `Drop`
///
/// Zero-sized. Construction and copying go through user code, so both are
/// reported as fallible.
pub struct DefaultFactory<T>(PhantomData<fn() -> T>);

impl<T> DefaultFactory<T> {
    /// Creates the factory
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for DefaultFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for DefaultFactory<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DefaultFactory<T> {}

impl<T> fmt::Debug for DefaultFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DefaultFactory<{}>", core::any::type_name::<T>())
    }
}

// SAFETY: uses the provided methods unchanged.
unsafe impl<T> Factory for DefaultFactory<T> {
    type Item = T;

    const INFALLIBLE_DEFAULT: bool = false;
    const INFALLIBLE_COPY: bool = false;
    const TRIVIAL_COPY: bool = false;
}

impl<T, U> Rebind<U> for DefaultFactory<T> {
    type Output = DefaultFactory<U>;

    fn rebind(&self) -> DefaultFactory<U> {
        DefaultFactory::new()
    }
}

/// Factory for `Copy` types that copies with `memcpy`
///
/// Zero-sized. Copying cannot fault and destruction is a no-op.
pub struct BitwiseFactory<T: Copy>(PhantomData<fn() -> T>);

impl<T: Copy> BitwiseFactory<T> {
    /// Creates the factory
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: Copy> Default for BitwiseFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> Clone for BitwiseFactory<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Copy> Copy for BitwiseFactory<T> {}

impl<T: Copy> fmt::Debug for BitwiseFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitwiseFactory<{}>", core::any::type_name::<T>())
    }
}

// SAFETY: copy_to writes every element with a bitwise copy of an initialized
// Copy value; destroy is a no-op because Copy types have no drop glue.
unsafe impl<T: Copy> Factory for BitwiseFactory<T> {
    type Item = T;

    const INFALLIBLE_DEFAULT: bool = false;
    const INFALLIBLE_COPY: bool = true;
    const TRIVIAL_COPY: bool = true;

    unsafe fn construct_fill(&self, dst: NonNull<T>, count: usize, value: &T) {
        for i in 0..count {
            // SAFETY: i < count
            unsafe { dst.add(i).write(*value) };
        }
    }

    unsafe fn copy_to(&self, dst: NonNull<T>, src: NonNull<T>, count: usize) {
        // SAFETY: caller contract; T: Copy
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), count) }
    }

    unsafe fn destroy(&self, _ptr: NonNull<T>, _count: usize) {}
}

impl<T: Copy, U: Copy> Rebind<U> for BitwiseFactory<T> {
    type Output = BitwiseFactory<U>;

    fn rebind(&self) -> BitwiseFactory<U> {
        BitwiseFactory::new()
    }
}

// ============================================================================
// Type-erased factory
// ============================================================================

/// Static trait flags of a factory, readable through an erased handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactoryFlags {
    pub infallible_default: bool,
    pub infallible_copy: bool,
    pub infallible_move: bool,
    pub trivial_copy: bool,
    pub trivial_relocate: bool,
}

impl FactoryFlags {
    /// Flags of factory `F`
    pub const fn of<F: Factory>() -> Self {
        Self {
            infallible_default: F::INFALLIBLE_DEFAULT,
            infallible_copy: F::INFALLIBLE_COPY,
            infallible_move: F::INFALLIBLE_MOVE,
            trivial_copy: F::TRIVIAL_COPY,
            trivial_relocate: F::TRIVIAL_RELOCATE,
        }
    }
}

type DestroyFn = unsafe fn(NonNull<u8>, usize);
type TransferFn = unsafe fn(NonNull<u8>, NonNull<u8>, usize);
type DefaultFn = unsafe fn(NonNull<u8>, usize);

unsafe fn destroy_erased<F: Factory + Default>(ptr: NonNull<u8>, count: usize) {
    // SAFETY: the table was built for F::Item, so ptr holds F::Item values.
    unsafe { F::default().destroy(ptr.cast(), count) }
}

unsafe fn move_erased<F: Factory + Default>(dst: NonNull<u8>, src: NonNull<u8>, count: usize) {
    // SAFETY: see destroy_erased
    unsafe { F::default().move_to(dst.cast(), src.cast(), count) }
}

unsafe fn copy_erased<F>(dst: NonNull<u8>, src: NonNull<u8>, count: usize)
where
    F: Factory + Default,
    F::Item: Clone,
{
    // SAFETY: see destroy_erased
    unsafe { F::default().copy_to(dst.cast(), src.cast(), count) }
}

unsafe fn default_erased<F>(dst: NonNull<u8>, count: usize)
where
    F: Factory + Default,
    F::Item: Default,
{
    // SAFETY: see destroy_erased
    unsafe { F::default().construct_default(dst.cast(), count) }
}

/// Runtime operation table for one element type
///
/// Built once from a stateless factory and then passed around by value. The
/// element type is fixed at construction; operations that need a trait the
/// element type was not registered with (`Clone` via [`with_copy`],
/// `Default` via [`with_default`]) fail with
/// [`MemoryError::NotSupported`].
///
/// [`with_copy`]: Self::with_copy
/// [`with_default`]: Self::with_default
#[derive(Clone, Copy)]
pub struct ErasedFactory {
    size: usize,
    align: usize,
    type_id: TypeId,
    type_name: &'static str,
    flags: FactoryFlags,
    destroy: DestroyFn,
    relocate: TransferFn,
    copy: Option<TransferFn>,
    construct_default: Option<DefaultFn>,
}

impl ErasedFactory {
    /// Table for the element type of `F`, with destroy and move only
    pub fn new<F>() -> Self
    where
        F: Factory + Default + 'static,
        F::Item: 'static,
    {
        Self {
            size: size_of::<F::Item>(),
            align: align_of::<F::Item>(),
            type_id: TypeId::of::<F::Item>(),
            type_name: core::any::type_name::<F::Item>(),
            flags: FactoryFlags::of::<F>(),
            destroy: destroy_erased::<F>,
            relocate: move_erased::<F>,
            copy: None,
            construct_default: None,
        }
    }

    /// Registers copy support through `F`
    #[must_use]
    pub fn with_copy<F>(mut self) -> Self
    where
        F: Factory + Default + 'static,
        F::Item: Clone + 'static,
    {
        debug_assert_eq!(
            self.type_id,
            TypeId::of::<F::Item>(),
            "copy registered for a different element type"
        );
        self.copy = Some(copy_erased::<F>);
        self
    }

    /// Registers default construction through `F`
    #[must_use]
    pub fn with_default<F>(mut self) -> Self
    where
        F: Factory + Default + 'static,
        F::Item: Default + 'static,
    {
        debug_assert_eq!(
            self.type_id,
            TypeId::of::<F::Item>(),
            "default registered for a different element type"
        );
        self.construct_default = Some(default_erased::<F>);
        self
    }

    /// Table for `T` through [`DefaultFactory`], with move and destroy only
    ///
    /// `trivial_copy()` is conservatively false even when `T: Copy`; use
    /// [`of_bitwise`](Self::of_bitwise) to report bitwise copies.
    pub fn of<T: 'static>() -> Self {
        Self::new::<DefaultFactory<T>>()
    }

    /// Table for `T` through [`DefaultFactory`] with copy and default support
    pub fn of_clone<T: Clone + Default + 'static>() -> Self {
        Self::new::<DefaultFactory<T>>()
            .with_copy::<DefaultFactory<T>>()
            .with_default::<DefaultFactory<T>>()
    }

    /// Table for `T` through [`BitwiseFactory`]; `trivial_copy()` is true
    pub fn of_bitwise<T: Copy + Default + 'static>() -> Self {
        Self::new::<BitwiseFactory<T>>()
            .with_copy::<BitwiseFactory<T>>()
            .with_default::<BitwiseFactory<T>>()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub fn flags(&self) -> FactoryFlags {
        self.flags
    }

    /// Whether copying an element is a raw byte copy
    #[inline]
    pub fn trivial_copy(&self) -> bool {
        self.flags.trivial_copy
    }

    pub fn supports_copy(&self) -> bool {
        self.copy.is_some()
    }

    pub fn supports_default(&self) -> bool {
        self.construct_default.is_some()
    }

    /// Whether this table was built for `T`
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Layout of `count` elements at the element's natural alignment
    pub fn layout_for(&self, count: usize) -> MemoryResult<core::alloc::Layout> {
        array_layout(self.size, self.align, count)
    }

    /// Drops `count` elements
    ///
    /// # Safety
    /// `ptr` must hold `count` initialized elements of the registered type.
    pub unsafe fn destroy(&self, ptr: NonNull<u8>, count: usize) {
        // SAFETY: forwarded caller contract
        unsafe { (self.destroy)(ptr, count) }
    }

    /// Relocates `count` elements
    ///
    /// # Safety
    /// Same as [`Factory::move_to`], for the registered type.
    pub unsafe fn move_to(&self, dst: NonNull<u8>, src: NonNull<u8>, count: usize) {
        // SAFETY: forwarded caller contract
        unsafe { (self.relocate)(dst, src, count) }
    }

    /// Copy-constructs `count` elements
    ///
    /// # Safety
    /// Same as [`Factory::copy_to`], for the registered type.
    pub unsafe fn copy_to(&self, dst: NonNull<u8>, src: NonNull<u8>, count: usize) -> MemoryResult<()> {
        let copy = self
            .copy
            .ok_or_else(|| MemoryError::not_supported("copy", self.type_name))?;
        // SAFETY: forwarded caller contract
        unsafe { copy(dst, src, count) };
        Ok(())
    }

    /// Default-constructs `count` elements
    ///
    /// # Safety
    /// Same as [`Factory::construct_default`], for the registered type.
    pub unsafe fn construct_default(&self, dst: NonNull<u8>, count: usize) -> MemoryResult<()> {
        let construct = self
            .construct_default
            .ok_or_else(|| MemoryError::not_supported("default construction", self.type_name))?;
        // SAFETY: forwarded caller contract
        unsafe { construct(dst, count) };
        Ok(())
    }
}

impl fmt::Debug for ErasedFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedFactory")
            .field("type_name", &self.type_name)
            .field("size", &self.size)
            .field("align", &self.align)
            .field("flags", &self.flags)
            .field("copy", &self.copy.is_some())
            .field("default", &self.construct_default.is_some())
            .finish()
    }
}
