//! # nebula-alloc
//!
//! Allocator, factory and reference-counting substrate for Nebula containers.
//!
//! The crate separates *where bytes come from* ([`allocator::Allocator`])
//! from *how elements are built and torn down* ([`factory::Factory`]) and
//! composes the two into:
//! - [`typed::TypedAllocator`], statically typed and zero-sized when both
//!   capabilities are stateless
//! - [`erased::TypeErasedAllocator`], the same operations over an element
//!   type chosen at runtime
//! - [`resource::ResourceBase`] and [`resource::ErasedResourceBase`], owners
//!   of a single backing block for container implementations
//! - [`counter::ReferenceCounter`] and [`managed::ManagedResource`] for
//!   pooled slots with armed/unarmed lifecycles
//! - [`index::IndexAllocator`], a recycler of integer handles
//!
//! ## Quick Start
//!
//! ```rust
//! use nebula_alloc::prelude::*;
//!
//! let strings: TypedAllocator<String, SystemAllocator> =
//!     TypedAllocator::new(SystemAllocator::new(), DefaultFactory::new());
//! assert!(TypedAllocator::<String, SystemAllocator>::IS_STATELESS);
//!
//! let block = strings.allocate_and_fill(3, &String::from("x"))?;
//! // SAFETY: three live strings were just built in `block`.
//! unsafe { strings.destroy_and_deallocate(block, 3) };
//! # Ok::<(), MemoryError>(())
//! ```
//!
//! ## Features
//!
//! - `logging` (default): structured logging via `tracing`
//!
//! ## Architecture
//!
//! nebula-alloc follows the Nebula ecosystem patterns:
//! - Standalone error handling via [`error`] module
//! - Plain-data configuration via [`config`] module
//! - Optional structured logging via `tracing` (feature: `logging`)

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(unsafe_code)]
#![warn(rust_2018_idioms)]
// Raw-pointer APIs document their contracts under `# Safety`; element
// operations share one contract spelled out at module level.
#![allow(clippy::missing_safety_doc)]

// Error types
pub mod error;

// Configuration
pub mod config;

// Capabilities
pub mod allocator;
pub mod factory;
pub mod storage;

// Composed allocators
pub mod erased;
pub mod typed;

// Containers and lifecycles
pub mod counter;
pub mod index;
pub mod managed;
pub mod resource;

// Re-export core types for convenience
pub use crate::allocator::{AllocError, AllocResult};
pub use crate::config::MemoryConfig;
pub use crate::error::{MemoryError, MemoryResult, Result};

// Public API exports
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::config::{AllocatorConfig, IndexConfig, MemoryConfig};
    pub use crate::error::{MemoryError, MemoryResult, Result};

    pub use crate::allocator::{
        AllocError, AllocResult, Allocator, PolymorphicAllocator, SystemAllocator,
        TrackedAllocator,
    };
    pub use crate::factory::{BitwiseFactory, DefaultFactory, ErasedFactory, Factory, Rebind};
    pub use crate::storage::{AllocatorStorage, FactoryStorage};

    pub use crate::erased::TypeErasedAllocator;
    pub use crate::typed::TypedAllocator;

    pub use crate::counter::{
        BasicReferenceCounter, CounterState, Disarm, ManualReferenceCounter, OnReset,
        ReferenceCounter,
    };
    pub use crate::index::{Index, IndexAllocator};
    pub use crate::managed::ManagedResource;
    pub use crate::resource::{ErasedResourceBase, ResourceBase};
}

use crate::allocator::{SystemAllocator, TrackedAllocator};

static TRACKER: TrackedAllocator<SystemAllocator> = TrackedAllocator::new(SystemAllocator::new());

/// Accounting allocator installed as the global default when
/// [`config::AllocatorConfig::track_allocations`] is set
pub fn tracker() -> &'static TrackedAllocator<SystemAllocator> {
    &TRACKER
}

/// Initialize nebula-alloc with default configuration.
///
/// # Examples
///
/// ```rust
/// fn main() -> nebula_alloc::MemoryResult<()> {
///     nebula_alloc::init()?;
///
///     // Your application code here
///
///     nebula_alloc::shutdown()
/// }
/// ```
pub fn init() -> MemoryResult<()> {
    init_with_config(&MemoryConfig::default())
}

/// Initialize nebula-alloc with the given configuration.
///
/// With allocation tracking enabled, [`tracker()`] becomes the process-global
/// default allocator; threads without their own override allocate through it.
pub fn init_with_config(config: &MemoryConfig) -> MemoryResult<()> {
    #[cfg(feature = "logging")]
    tracing::debug!("initializing nebula-alloc");

    config.validate()?;

    if config.allocator.track_allocations {
        allocator::set_global_default(&TRACKER);
    }

    #[cfg(feature = "logging")]
    tracing::info!(
        track_allocations = config.allocator.track_allocations,
        "nebula-alloc initialized"
    );

    Ok(())
}

/// Remove the process-global default installed by [`init_with_config`].
///
/// Handles that already resolved it keep allocating through it.
pub fn shutdown() -> MemoryResult<()> {
    let previous = allocator::take_global_default();

    #[cfg(feature = "logging")]
    {
        if TRACKER.has_leaks() {
            tracing::warn!(
                live_bytes = TRACKER.allocated_bytes(),
                "tracked allocations outstanding at shutdown"
            );
        }
        tracing::info!(
            had_global_default = previous.is_some(),
            "nebula-alloc shut down"
        );
    }
    #[cfg(not(feature = "logging"))]
    let _ = previous;

    Ok(())
}
