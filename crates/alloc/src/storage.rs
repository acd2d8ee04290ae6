//! Storage wrappers for allocator and factory capabilities
//!
//! Both wrappers hold their capability by value. A stateless capability is a
//! zero-sized type, so the wrapper is zero-sized too and every instance is
//! interchangeable with every other. The stateful case is
//! [`PolymorphicAllocator`], which is itself just a pointer: copying the
//! storage copies the pointer, never the allocator behind it.
//!
//! [`PolymorphicAllocator`]: crate::allocator::PolymorphicAllocator

use core::ops::Deref;

use crate::allocator::Allocator;
use crate::factory::Factory;

/// Holder of an allocator capability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct AllocatorStorage<A> {
    alloc: A,
}

impl<A: Allocator> AllocatorStorage<A> {
    /// True when `A` carries no state and the storage occupies no bytes
    pub const IS_STATELESS: bool = size_of::<A>() == 0;

    pub const fn new(alloc: A) -> Self {
        Self { alloc }
    }

    #[inline]
    pub const fn is_stateless() -> bool {
        Self::IS_STATELESS
    }

    #[inline]
    pub fn get(&self) -> &A {
        &self.alloc
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut A {
        &mut self.alloc
    }

    pub fn into_inner(self) -> A {
        self.alloc
    }
}

impl<A: Allocator> Deref for AllocatorStorage<A> {
    type Target = A;

    fn deref(&self) -> &A {
        &self.alloc
    }
}

/// Holder of a factory capability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct FactoryStorage<F> {
    factory: F,
}

impl<F: Factory> FactoryStorage<F> {
    /// True when `F` carries no state and the storage occupies no bytes
    pub const IS_STATELESS: bool = size_of::<F>() == 0;

    pub const fn new(factory: F) -> Self {
        Self { factory }
    }

    #[inline]
    pub const fn is_stateless() -> bool {
        Self::IS_STATELESS
    }

    #[inline]
    pub fn get(&self) -> &F {
        &self.factory
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    pub fn into_inner(self) -> F {
        self.factory
    }
}

impl<F: Factory> Deref for FactoryStorage<F> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.factory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{PolymorphicAllocator, SystemAllocator, TrackedAllocator};
    use crate::factory::{BitwiseFactory, DefaultFactory};

    #[test]
    fn stateless_storage_is_zero_sized() {
        assert!(AllocatorStorage::<SystemAllocator>::is_stateless());
        assert!(FactoryStorage::<DefaultFactory<String>>::is_stateless());
        assert!(FactoryStorage::<BitwiseFactory<u8>>::is_stateless());
        assert_eq!(size_of::<AllocatorStorage<SystemAllocator>>(), 0);
        assert_eq!(size_of::<FactoryStorage<DefaultFactory<String>>>(), 0);
    }

    #[test]
    fn polymorphic_storage_holds_a_pointer() {
        assert!(!AllocatorStorage::<PolymorphicAllocator>::is_stateless());
        assert_eq!(
            size_of::<AllocatorStorage<PolymorphicAllocator>>(),
            size_of::<PolymorphicAllocator>()
        );
    }

    #[test]
    fn copy_shares_the_pointed_allocator() {
        static TRACKED: TrackedAllocator<SystemAllocator> =
            TrackedAllocator::new(SystemAllocator::new());

        let storage = AllocatorStorage::new(PolymorphicAllocator::new(&TRACKED));
        let copy = storage;
        assert_eq!(storage, copy);
        assert!(core::ptr::addr_eq(copy.get().resource(), &TRACKED));
    }
}
