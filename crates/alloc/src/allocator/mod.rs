//! Allocator capability and the allocators shipped with it
//!
//! This module provides the raw-byte [`Allocator`] trait, the platform-backed
//! [`SystemAllocator`], an accounting wrapper, the [`PolymorphicAllocator`]
//! handle and the default-allocator resolution chain.

mod default;
mod guard;
mod polymorphic;
mod system;
mod tracked;
mod traits;

pub use crate::error::{AllocError, AllocResult};
pub use default::{
    global_default, set_global_default, set_thread_default, system, take_global_default,
    thread_default, with_thread_default,
};
pub use polymorphic::PolymorphicAllocator;
pub use system::SystemAllocator;
pub use tracked::{AllocationStats, TrackedAllocator};
pub use traits::Allocator;

pub(crate) use guard::BlockGuard;
pub(crate) use traits::array_layout;
