//! Default allocator resolution
//!
//! Resolution order for "the current default allocator":
//!
//! 1. the calling thread's override, if one is installed
//! 2. the process-global default, if one is installed
//! 3. the static [`SystemAllocator`]
//!
//! Both override slots hold `'static` references, so an allocator stays valid
//! for as long as any handle resolved from it might be alive. Overrides are
//! independent: changing the global default never touches thread overrides.
//! Installing a global default while other threads are resolving defaults is
//! allowed, but handles already resolved keep pointing at the previous one.

use core::cell::Cell;

use parking_lot::RwLock;

#[cfg(feature = "logging")]
use tracing::debug;

use super::{Allocator, SystemAllocator};

/// Terminal fallback of the resolution chain
static SYSTEM: SystemAllocator = SystemAllocator::new();

/// Process-global default slot
static GLOBAL_DEFAULT: RwLock<Option<&'static (dyn Allocator + Sync)>> =
    parking_lot::const_rwlock(None);

thread_local! {
    static THREAD_DEFAULT: Cell<Option<&'static dyn Allocator>> = const { Cell::new(None) };
}

/// The static system allocator that ends the resolution chain
#[inline]
pub fn system() -> &'static SystemAllocator {
    &SYSTEM
}

/// The process-global default, or the system allocator if none is installed
pub fn global_default() -> &'static (dyn Allocator + Sync) {
    match *GLOBAL_DEFAULT.read() {
        Some(alloc) => alloc,
        None => &SYSTEM,
    }
}

/// Installs `alloc` as the process-global default, returning the previous one
pub fn set_global_default(
    alloc: &'static (dyn Allocator + Sync),
) -> Option<&'static (dyn Allocator + Sync)> {
    #[cfg(feature = "logging")]
    debug!(
        allocator = ?core::ptr::from_ref(alloc).cast::<()>(),
        "installing global default allocator"
    );

    GLOBAL_DEFAULT.write().replace(alloc)
}

/// Removes the process-global default override, returning it
pub fn take_global_default() -> Option<&'static (dyn Allocator + Sync)> {
    #[cfg(feature = "logging")]
    debug!("clearing global default allocator");

    GLOBAL_DEFAULT.write().take()
}

/// The calling thread's default allocator
///
/// Falls back to [`global_default`] when the thread has no override.
pub fn thread_default() -> &'static dyn Allocator {
    match THREAD_DEFAULT.with(Cell::get) {
        Some(alloc) => alloc,
        None => global_default(),
    }
}

/// Sets or clears the calling thread's override, returning the previous one
pub fn set_thread_default(alloc: Option<&'static dyn Allocator>) -> Option<&'static dyn Allocator> {
    #[cfg(feature = "logging")]
    debug!(
        installed = alloc.is_some(),
        "changing thread default allocator"
    );

    THREAD_DEFAULT.with(|slot| slot.replace(alloc))
}

/// Runs `f` with `alloc` as the calling thread's default allocator
///
/// The previous override is restored when `f` returns or unwinds.
///
/// # Examples
///
/// ```
/// use nebula_alloc::allocator::{self, SystemAllocator, TrackedAllocator};
///
/// static LOCAL: TrackedAllocator<SystemAllocator> = TrackedAllocator::new(SystemAllocator::new());
///
/// allocator::with_thread_default(&LOCAL, || {
///     let current = allocator::thread_default();
///     assert!(core::ptr::addr_eq(current, &LOCAL));
/// });
/// ```
pub fn with_thread_default<F, R>(alloc: &'static dyn Allocator, f: F) -> R
where
    F: FnOnce() -> R,
{
    struct Restore(Option<&'static dyn Allocator>);

    impl Drop for Restore {
        fn drop(&mut self) {
            THREAD_DEFAULT.with(|slot| slot.set(self.0));
        }
    }

    let _restore = Restore(THREAD_DEFAULT.with(|slot| slot.replace(Some(alloc))));
    f()
}
