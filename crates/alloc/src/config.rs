//! Configuration for nebula-alloc
//!
//! Configuration is plain data: build a [`MemoryConfig`] from a preset or the
//! builder, then hand it to [`crate::init_with_config`].

use crate::error::{MemoryError, MemoryResult};

// ============================================================================
// Core Configuration Types
// ============================================================================

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Default allocator installation
    pub allocator: AllocatorConfig,
    /// Handle pools built with [`crate::index::IndexAllocator::with_config`]
    pub index: IndexConfig,
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// No accounting overhead
    pub fn production() -> Self {
        Self {
            allocator: AllocatorConfig::production(),
            index: IndexConfig::default(),
        }
    }

    /// Tracks every allocation made through the default allocator
    pub fn debug() -> Self {
        Self {
            allocator: AllocatorConfig::debug(),
            index: IndexConfig::default(),
        }
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> MemoryResult<()> {
        #[cfg(feature = "logging")]
        tracing::debug!("validating memory configuration");

        self.allocator
            .validate()
            .map_err(|e| MemoryError::invalid_config(&format!("allocator: {e}")))?;
        self.index
            .validate()
            .map_err(|e| MemoryError::invalid_config(&format!("index: {e}")))?;

        Ok(())
    }

    pub fn builder() -> MemoryConfigBuilder {
        MemoryConfigBuilder::new()
    }
}

/// Default allocator configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Install a process-lifetime `TrackedAllocator<SystemAllocator>` as the
    /// global default during init
    pub track_allocations: bool,
}

impl AllocatorConfig {
    pub const fn production() -> Self {
        Self {
            track_allocations: false,
        }
    }

    pub const fn debug() -> Self {
        Self {
            track_allocations: true,
        }
    }

    pub fn validate(&self) -> MemoryResult<()> {
        Ok(())
    }
}

/// Handle pool configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexConfig {
    /// First handle issued
    pub offset: usize,
    /// Handles placed on the free list up front, starting at `offset`
    pub reserve: usize,
}

impl IndexConfig {
    pub fn validate(&self) -> MemoryResult<()> {
        if self.offset.checked_add(self.reserve).is_none() {
            return Err(MemoryError::invalid_config(
                "offset + reserve overflows the handle range",
            ));
        }

        #[cfg(feature = "logging")]
        if self.reserve > 1 << 20 {
            tracing::warn!(
                reserve = self.reserve,
                "large index reservation allocates its free list eagerly"
            );
        }

        Ok(())
    }
}

// ============================================================================
// Configuration Builder
// ============================================================================

/// Builder for [`MemoryConfig`]
#[derive(Debug, Default)]
pub struct MemoryConfigBuilder {
    config: MemoryConfig,
}

impl MemoryConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn allocator(mut self, allocator: AllocatorConfig) -> Self {
        self.config.allocator = allocator;
        self
    }

    #[must_use]
    pub fn track_allocations(mut self, enabled: bool) -> Self {
        self.config.allocator.track_allocations = enabled;
        self
    }

    #[must_use]
    pub fn index(mut self, index: IndexConfig) -> Self {
        self.config.index = index;
        self
    }

    #[must_use]
    pub fn index_offset(mut self, offset: usize) -> Self {
        self.config.index.offset = offset;
        self
    }

    #[must_use]
    pub fn index_reserve(mut self, reserve: usize) -> Self {
        self.config.index.reserve = reserve;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> MemoryResult<MemoryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
