//! Shared ownership of a value destroyed by a caller-supplied deleter
//!
//! [`ManagedResource`] wraps values that must not simply be dropped (foreign
//! handles, pooled slots) and hands them to a deleter instead. Clones share
//! one allocator-backed [`BasicReferenceCounter`] whose payload is the value
//! together with its deleter; the deleter runs from [`Disarm::on_disarm`],
//! once, when the last armed handle lets go.
//!
//! The counter keeps its payload in a block of its own, so adjusting the
//! count never touches memory a handle has lent out through
//! [`ManagedResource::get`].

use core::fmt;
use core::ptr::NonNull;

use crate::allocator::{AllocResult, Allocator, PolymorphicAllocator};
use crate::counter::{BasicReferenceCounter, Disarm, ReferenceCounter};
use crate::factory::DefaultFactory;
use crate::typed::TypedAllocator;

/// Pending deletion: the value and the deleter it goes to
struct Pending<T, D> {
    value: Option<T>,
    deleter: Option<D>,
}

impl<T, D: FnOnce(T)> Disarm for Pending<T, D> {
    fn on_disarm(&mut self) {
        if let (Some(value), Some(deleter)) = (self.value.take(), self.deleter.take()) {
            deleter(value);
        }
    }
}

type Control<T, D, A> = BasicReferenceCounter<Pending<T, D>, A>;

/// Reference-counted handle to a value with a custom deleter
///
/// A fresh handle is unarmed and owns nothing. [`arm`](Self::arm) stores the
/// value in newly allocated storage; clones of an armed handle share it.
/// Dropping or [`disarm`](Self::disarm)ing the last handle invokes the
/// deleter on the value and frees the storage.
///
/// Not thread-safe: handles are neither `Send` nor `Sync`.
///
/// # Examples
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// use nebula_alloc::managed::ManagedResource;
///
/// let closed = Rc::new(Cell::new(false));
/// let flag = closed.clone();
///
/// let mut handle = ManagedResource::new();
/// handle.arm(move |fd: i32| { assert_eq!(fd, 7); flag.set(true) }, 7)?;
///
/// let shared = handle.clone();
/// assert_eq!(shared.use_count(), 2);
/// drop(handle);
/// assert!(!closed.get());
/// drop(shared);
/// assert!(closed.get());
/// # Ok::<(), nebula_alloc::MemoryError>(())
/// ```
pub struct ManagedResource<T, D = fn(T), A = PolymorphicAllocator>
where
    D: FnOnce(T),
    A: Allocator,
{
    block: Option<NonNull<Control<T, D, A>>>,
    alloc: TypedAllocator<Control<T, D, A>, A, DefaultFactory<Control<T, D, A>>>,
}

impl<T, D, A> ManagedResource<T, D, A>
where
    D: FnOnce(T),
    A: Allocator,
{
    /// Unarmed handle allocating through `alloc`
    pub fn with_allocator(alloc: A) -> Self {
        Self {
            block: None,
            alloc: TypedAllocator::new(alloc, DefaultFactory::new()),
        }
    }

    /// Stores `value`, to be passed to `deleter` when the last handle releases
    ///
    /// Arming an armed handle is a caller error; debug builds assert, release
    /// builds first let go of the current value. If allocation fails the
    /// value is dropped, not passed to the deleter.
    pub fn arm(&mut self, deleter: D, value: T) -> AllocResult<()>
    where
        A: Clone,
    {
        debug_assert!(self.block.is_none(), "arming an armed managed resource");
        self.disarm();

        let block = self
            .alloc
            .allocate_and_construct_with(1, |_| BasicReferenceCounter::new(self.alloc.retarget()))?;
        // SAFETY: the block is fresh and no other handle sees it yet.
        let counter = unsafe { &mut *block.as_ptr() };

        let pending = Pending {
            value: Some(value),
            deleter: Some(deleter),
        };
        if let Err(err) = counter.arm_with_value(pending) {
            // SAFETY: the unarmed counter is the block's only element.
            unsafe { self.alloc.destroy_and_deallocate(block, 1) };
            return Err(err);
        }
        counter.borrow();

        self.block = Some(block);
        Ok(())
    }

    /// Builds the value with `init`, then arms
    pub fn arm_with<I>(&mut self, deleter: D, init: I) -> AllocResult<()>
    where
        A: Clone,
        I: FnOnce() -> T,
    {
        self.arm(deleter, init())
    }

    fn counter(&self) -> Option<&Control<T, D, A>> {
        // SAFETY: the block is live while this handle holds it.
        self.block.map(|b| unsafe { b.as_ref() })
    }

    /// The managed value, if armed
    pub fn get(&self) -> Option<&T> {
        self.counter()
            .and_then(BasicReferenceCounter::get)
            .and_then(|pending| pending.value.as_ref())
    }

    /// Number of handles sharing the value; 0 when unarmed
    pub fn use_count(&self) -> usize {
        self.counter().map_or(0, ReferenceCounter::count)
    }

    pub fn is_armed(&self) -> bool {
        self.block.is_some()
    }

    /// Lets go of this handle's reference
    ///
    /// The deleter runs if this was the last one. The handle is unarmed
    /// afterwards and can be armed again.
    pub fn disarm(&mut self) {
        let Some(mut block) = self.block.take() else {
            return;
        };

        // SAFETY: the block is live until its count reaches zero, which
        // happens only in this release.
        let remaining = unsafe { block.as_mut().release() };
        if remaining == 0 {
            // SAFETY: last reference; the counter has run the deleter, freed
            // its payload and nothing else points at the block.
            unsafe { self.alloc.destroy_and_deallocate(block, 1) };
        }
    }
}

impl<T, D> ManagedResource<T, D, PolymorphicAllocator>
where
    D: FnOnce(T),
{
    /// Unarmed handle using the calling thread's default allocator
    pub fn new() -> Self {
        Self::with_allocator(PolymorphicAllocator::default())
    }
}

impl<T, D> Default for ManagedResource<T, D, PolymorphicAllocator>
where
    D: FnOnce(T),
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, D, A> Clone for ManagedResource<T, D, A>
where
    D: FnOnce(T),
    A: Allocator + Clone,
{
    fn clone(&self) -> Self {
        if let Some(mut block) = self.block {
            // SAFETY: the block is live while this handle holds it.
            unsafe { block.as_mut().borrow() };
        }
        Self {
            block: self.block,
            alloc: self.alloc.clone(),
        }
    }
}

impl<T, D, A> Drop for ManagedResource<T, D, A>
where
    D: FnOnce(T),
    A: Allocator,
{
    fn drop(&mut self) {
        self.disarm();
    }
}

impl<T, D, A> fmt::Debug for ManagedResource<T, D, A>
where
    T: fmt::Debug,
    D: FnOnce(T),
    A: Allocator,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedResource")
            .field("value", &self.get())
            .field("use_count", &self.use_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::allocator::{SystemAllocator, TrackedAllocator};

    type Tracked = TrackedAllocator<SystemAllocator>;

    fn tracker() -> &'static Tracked {
        Box::leak(Box::new(Tracked::new(SystemAllocator::new())))
    }

    #[test]
    fn unarmed_handle_never_deletes() {
        let handle: ManagedResource<u32> = ManagedResource::new();
        assert!(!handle.is_armed());
        assert_eq!(handle.use_count(), 0);
        assert!(handle.get().is_none());
    }

    #[test]
    fn deleter_runs_once_after_last_clone() {
        let tracker = tracker();
        let deleted = Rc::new(RefCell::new(Vec::new()));
        let sink = deleted.clone();

        let mut first = ManagedResource::with_allocator(tracker);
        first
            .arm(move |v: String| sink.borrow_mut().push(v), String::from("handle"))
            .unwrap();

        let second = first.clone();
        let third = second.clone();
        assert_eq!(first.use_count(), 3);
        assert_eq!(third.get().map(String::as_str), Some("handle"));

        drop(first);
        drop(third);
        assert!(deleted.borrow().is_empty());
        assert_eq!(second.use_count(), 1);

        drop(second);
        assert_eq!(*deleted.borrow(), ["handle"]);
        assert!(!tracker.has_leaks());
    }

    #[test]
    fn shared_state_lives_in_a_basic_counter() {
        use crate::counter::CounterState;

        type Handle = ManagedResource<u64, fn(u64), &'static Tracked>;

        let tracker = tracker();
        let mut handle: Handle = ManagedResource::with_allocator(tracker);
        handle.arm(drop, 42).unwrap();

        // Control block plus the counter's payload block.
        assert_eq!(tracker.allocation_count(), 2);
        assert_eq!(
            tracker.allocated_bytes(),
            size_of::<Control<u64, fn(u64), &'static Tracked>>() + size_of::<Pending<u64, fn(u64)>>()
        );

        let clone = handle.clone();
        let counter = handle.counter().unwrap();
        assert_eq!(counter.state(), CounterState::Armed { count: 2 });
        assert!(core::ptr::eq(
            counter.get().and_then(|p| p.value.as_ref()).unwrap(),
            clone.get().unwrap()
        ));

        drop(clone);
        drop(handle);
        assert!(!tracker.has_leaks());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "arming an armed managed resource")]
    fn double_arm_asserts_in_debug() {
        let mut handle = ManagedResource::<u8, fn(u8), _>::with_allocator(SystemAllocator::new());
        handle.arm(drop, 1).unwrap();
        let _ = handle.arm(drop, 2);
    }

    #[test]
    fn disarm_then_rearm() {
        let tracker = tracker();
        let count = Rc::new(Cell::new(0));
        let bump = |c: Rc<Cell<i32>>| c.set(c.get() + 1);

        let mut handle = ManagedResource::<Rc<Cell<i32>>, _, _>::with_allocator(tracker);
        handle.arm(bump, count.clone()).unwrap();
        handle.disarm();
        assert_eq!(count.get(), 1);
        assert!(!handle.is_armed());

        handle.arm_with(bump, || count.clone()).unwrap();
        drop(handle);
        assert_eq!(count.get(), 2);
        assert!(!tracker.has_leaks());
    }

    #[test]
    fn clone_of_unarmed_is_unarmed() {
        let handle = ManagedResource::<u8, fn(u8), _>::with_allocator(SystemAllocator::new());
        let copy = handle.clone();
        assert!(!copy.is_armed());
    }

    #[test]
    fn value_is_not_dropped_twice() {
        struct Loud(Rc<Cell<usize>>);
        impl Drop for Loud {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let drops = Rc::new(Cell::new(0));
        let mut handle = ManagedResource::with_allocator(SystemAllocator::new());
        handle.arm(drop::<Loud>, Loud(drops.clone())).unwrap();
        let clone = handle.clone();
        drop(handle);
        drop(clone);
        assert_eq!(drops.get(), 1);
    }
}
