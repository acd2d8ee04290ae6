//! Reference counters with an explicit armed/unarmed lifecycle
//!
//! ```text
//!   Unarmed --arm()--> Armed { count: 0 }
//!   Armed { n } --borrow()--> Armed { n + 1 }
//!   Armed { n > 1 } --release()--> Armed { n - 1 }
//!   Armed { 1 } --release()--> on_reset(), Unarmed
//!   any --reset()--> on_reset(), Unarmed
//! ```
//!
//! `borrow()` and `release()` return the count after the change, so a caller
//! sees `1` on the first borrow and `0` on the release that emptied the slot.
//!
//! Counting is single-threaded; sharing a counter across threads needs
//! external synchronization. Contract violations (re-arming, borrowing or
//! releasing while unarmed, releasing at zero) are caught by debug
//! assertions only and are otherwise ignored.

use core::fmt;

#[cfg(feature = "logging")]
use tracing::warn;

use crate::allocator::{AllocResult, Allocator, PolymorphicAllocator};
use crate::factory::{DefaultFactory, Factory};
use crate::resource::ResourceBase;
use crate::typed::TypedAllocator;

/// Lifecycle state of a counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CounterState {
    /// No guarded object is live
    #[default]
    Unarmed,
    /// A guarded object is live with `count` outstanding borrows
    Armed { count: usize },
}

/// Hook invoked once each time a counter transitions to empty
pub trait OnReset {
    fn on_reset(&mut self);
}

impl OnReset for () {
    fn on_reset(&mut self) {}
}

/// Common protocol of the counters in this module
pub trait ReferenceCounter {
    /// Unarmed to armed, count 0
    fn arm(&mut self);

    /// Adds a borrow; returns the new count
    fn borrow(&mut self) -> usize;

    /// Drops a borrow; returns the new count, firing the reset hook at 0
    fn release(&mut self) -> usize;

    /// Forces the counter empty, firing the reset hook unconditionally
    fn reset(&mut self);

    fn state(&self) -> CounterState;

    fn count(&self) -> usize {
        match self.state() {
            CounterState::Armed { count } => count,
            CounterState::Unarmed => 0,
        }
    }

    fn is_armed(&self) -> bool {
        matches!(self.state(), CounterState::Armed { .. })
    }

    /// Armed with at least one outstanding borrow
    fn occupied(&self) -> bool {
        matches!(self.state(), CounterState::Armed { count } if count > 0)
    }

    fn free(&self) -> bool {
        !self.occupied()
    }
}

// ============================================================================
// Manual counter
// ============================================================================

/// Counter whose only side effect is the [`OnReset`] hook
///
/// # Examples
///
/// ```
/// use nebula_alloc::counter::{ManualReferenceCounter, OnReset, ReferenceCounter};
///
/// #[derive(Default)]
/// struct Resets(u32);
///
/// impl OnReset for Resets {
///     fn on_reset(&mut self) {
///         self.0 += 1;
///     }
/// }
///
/// let mut counter = ManualReferenceCounter::new(Resets::default());
/// counter.arm();
/// assert_eq!(counter.borrow(), 1);
/// assert_eq!(counter.borrow(), 2);
/// assert_eq!(counter.release(), 1);
/// assert_eq!(counter.release(), 0);
/// assert!(!counter.is_armed());
/// assert_eq!(counter.hook().0, 1);
/// ```
#[derive(Debug, Default)]
pub struct ManualReferenceCounter<H: OnReset = ()> {
    state: CounterState,
    hook: H,
}

impl<H: OnReset> ManualReferenceCounter<H> {
    pub const fn new(hook: H) -> Self {
        Self {
            state: CounterState::Unarmed,
            hook,
        }
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    pub fn hook_mut(&mut self) -> &mut H {
        &mut self.hook
    }

    pub fn into_hook(self) -> H {
        self.hook
    }

    fn fire(&mut self) {
        self.state = CounterState::Unarmed;
        self.hook.on_reset();
    }
}

impl<H: OnReset> ReferenceCounter for ManualReferenceCounter<H> {
    fn arm(&mut self) {
        debug_assert!(!self.is_armed(), "arming an armed counter");
        self.state = CounterState::Armed { count: 0 };
    }

    fn borrow(&mut self) -> usize {
        debug_assert!(self.is_armed(), "borrowing an unarmed counter");
        match &mut self.state {
            CounterState::Armed { count } => {
                *count += 1;
                *count
            }
            CounterState::Unarmed => 0,
        }
    }

    fn release(&mut self) -> usize {
        debug_assert!(self.occupied(), "releasing a counter with no borrows");
        match self.state {
            CounterState::Armed { count: 1 } => {
                self.fire();
                0
            }
            CounterState::Armed { count } if count > 1 => {
                self.state = CounterState::Armed { count: count - 1 };
                count - 1
            }
            _ => 0,
        }
    }

    fn reset(&mut self) {
        #[cfg(feature = "logging")]
        if self.occupied() {
            warn!(count = self.count(), "forcing reset of a borrowed counter");
        }

        self.fire();
    }

    fn state(&self) -> CounterState {
        self.state
    }
}

// ============================================================================
// Basic counter: payload in allocator-managed storage
// ============================================================================

/// Hook run on a [`BasicReferenceCounter`] payload just before it is destroyed
pub trait Disarm {
    fn on_disarm(&mut self) {}
}

/// Reset hook owning the payload storage of a basic counter
struct PayloadSlot<C, A, F>
where
    C: Disarm,
    A: Allocator,
    F: Factory<Item = C>,
{
    resource: ResourceBase<C, A, F>,
}

impl<C, A, F> OnReset for PayloadSlot<C, A, F>
where
    C: Disarm,
    A: Allocator,
    F: Factory<Item = C>,
{
    fn on_reset(&mut self) {
        /// Drops and frees the payload even if `on_disarm` unwinds
        struct Teardown<'a, C, A, F>(&'a mut ResourceBase<C, A, F>)
        where
            A: Allocator,
            F: Factory<Item = C>;

        impl<C, A, F> Drop for Teardown<'_, C, A, F>
        where
            A: Allocator,
            F: Factory<Item = C>,
        {
            fn drop(&mut self) {
                // SAFETY: slot 0 holds the payload until this drop.
                unsafe { self.0.destroy(0, 1) };
                self.0.deallocate();
            }
        }

        let Some(mut payload) = self.resource.as_ptr() else {
            return;
        };
        let _teardown = Teardown(&mut self.resource);
        // SAFETY: while a block is held, slot 0 holds the armed payload.
        unsafe { payload.as_mut().on_disarm() };
    }
}

/// Counter whose armed state owns a `C` allocated through `A` and built by `F`
///
/// Arming allocates and constructs the payload; the release that empties the
/// counter (or a forced `reset`) calls [`Disarm::on_disarm`] on it, drops it
/// and returns its storage. Dropping an armed counter does the same.
pub struct BasicReferenceCounter<C, A = PolymorphicAllocator, F = DefaultFactory<C>>
where
    C: Disarm,
    A: Allocator,
    F: Factory<Item = C>,
{
    inner: ManualReferenceCounter<PayloadSlot<C, A, F>>,
}

impl<C, A, F> BasicReferenceCounter<C, A, F>
where
    C: Disarm,
    A: Allocator,
    F: Factory<Item = C>,
{
    pub fn new(alloc: TypedAllocator<C, A, F>) -> Self {
        Self {
            inner: ManualReferenceCounter::new(PayloadSlot {
                resource: ResourceBase::new(alloc),
            }),
        }
    }

    /// Allocates and constructs `value`, then arms with count 0
    ///
    /// Fails on allocation failure, or with `InvalidState` if already armed.
    pub fn arm_with_value(&mut self, value: C) -> AllocResult<()> {
        debug_assert!(!self.inner.is_armed(), "arming an armed counter");

        let resource = &mut self.inner.hook_mut().resource;
        resource.allocate(1)?;
        let mut value = Some(value);
        // SAFETY: slot 0 of the fresh block is uninitialized; the closure is
        // called exactly once.
        unsafe {
            resource.construct_with(0, 1, |_| match value.take() {
                Some(v) => v,
                None => unreachable!("payload constructed twice"),
            });
        }
        self.inner.arm();
        Ok(())
    }

    /// The live payload
    pub fn get(&self) -> Option<&C> {
        // SAFETY: a held block always contains the constructed payload.
        self.inner
            .hook()
            .resource
            .as_ptr()
            .map(|p| unsafe { p.as_ref() })
    }

    pub fn get_mut(&mut self) -> Option<&mut C> {
        // SAFETY: as in `get`, with unique access through &mut self.
        self.inner
            .hook_mut()
            .resource
            .as_ptr()
            .map(|mut p| unsafe { p.as_mut() })
    }
}

impl<C, A, F> ReferenceCounter for BasicReferenceCounter<C, A, F>
where
    C: Disarm,
    A: Allocator,
    F: Factory<Item = C>,
{
    /// Arms an already-populated counter
    ///
    /// Without a payload this is equivalent to [`ManualReferenceCounter::arm`];
    /// use [`BasicReferenceCounter::arm_with_value`] to populate it.
    fn arm(&mut self) {
        self.inner.arm();
    }

    fn borrow(&mut self) -> usize {
        self.inner.borrow()
    }

    fn release(&mut self) -> usize {
        self.inner.release()
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn state(&self) -> CounterState {
        self.inner.state()
    }
}

impl<C, A, F> Default for BasicReferenceCounter<C, A, F>
where
    C: Disarm,
    A: Allocator + Default,
    F: Factory<Item = C> + Default,
{
    fn default() -> Self {
        Self::new(TypedAllocator::default())
    }
}

impl<C, A, F> Drop for BasicReferenceCounter<C, A, F>
where
    C: Disarm,
    A: Allocator,
    F: Factory<Item = C>,
{
    fn drop(&mut self) {
        if self.inner.hook().resource.is_allocated() {
            self.inner.fire();
        }
    }
}

impl<C, A, F> fmt::Debug for BasicReferenceCounter<C, A, F>
where
    C: Disarm + fmt::Debug,
    A: Allocator,
    F: Factory<Item = C>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicReferenceCounter")
            .field("state", &self.inner.state())
            .field("payload", &self.get())
            .finish()
    }
}
