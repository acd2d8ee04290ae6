//! Default-allocator resolution and crate initialization
//!
//! Only `init_and_shutdown_install_the_tracker` touches the process-global
//! slot; the other tests confine themselves to thread-local overrides.

use std::thread;

use nebula_alloc::allocator::{self, with_thread_default};
use nebula_alloc::prelude::*;

type Tracked = TrackedAllocator<SystemAllocator>;

fn leak_tracker() -> &'static Tracked {
    Box::leak(Box::new(Tracked::new(SystemAllocator::new())))
}

#[test]
fn init_and_shutdown_install_the_tracker() {
    nebula_alloc::init_with_config(&MemoryConfig::debug()).unwrap();
    assert!(core::ptr::addr_eq(
        allocator::global_default(),
        nebula_alloc::tracker()
    ));

    // A fresh thread has no override, so it resolves the global default.
    let before = nebula_alloc::tracker().allocation_count();
    thread::spawn(|| {
        let alloc: TypedAllocator<u64> = TypedAllocator::default();
        let block = alloc.allocate_and_construct(8).unwrap();
        // SAFETY: 8 live values.
        unsafe { alloc.destroy_and_deallocate(block, 8) };
    })
    .join()
    .unwrap();
    assert!(nebula_alloc::tracker().allocation_count() > before);

    nebula_alloc::shutdown().unwrap();
    assert!(core::ptr::addr_eq(
        allocator::global_default(),
        allocator::system()
    ));
}

#[test]
fn scoped_override_routes_polymorphic_allocations() {
    let tracker = leak_tracker();

    with_thread_default(tracker, || {
        let strings: TypedAllocator<String> = TypedAllocator::default();
        let block = strings.allocate_and_fill(2, &"pooled".to_owned()).unwrap();
        assert_eq!(tracker.allocation_count(), 1);
        // SAFETY: 2 live strings.
        unsafe { strings.destroy_and_deallocate(block, 2) };
    });

    assert!(!tracker.has_leaks());
    assert!(!core::ptr::addr_eq(allocator::thread_default(), tracker));
}

#[test]
fn polymorphic_handles_compare_by_resource() {
    let first = leak_tracker();
    let second = leak_tracker();

    let a = PolymorphicAllocator::new(first);
    let b = PolymorphicAllocator::new(first);
    let c = PolymorphicAllocator::new(second);
    assert_eq!(a, b);
    assert_ne!(a, c);

    let inside = with_thread_default(second, PolymorphicAllocator::default);
    assert_eq!(inside, c);
}

#[test]
fn overrides_are_per_thread() {
    let tracker = leak_tracker();

    with_thread_default(tracker, || {
        let other = thread::spawn(|| {
            let alloc = allocator::thread_default();
            core::ptr::from_ref(alloc).cast::<()>() as usize
        })
        .join()
        .unwrap();
        assert_ne!(other, core::ptr::from_ref(tracker).cast::<()>() as usize);
    });
}
