//! Standalone error types for nebula-alloc
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.
//!
//! Only recoverable conditions are represented here: allocation failure,
//! layout overflow, invalid configuration and unsupported operations on an
//! erased element type.
//! Caller-contract violations (double index free, releasing an unarmed
//! counter, re-arming) are preconditions checked by debug assertions and never
//! surface as errors.

use core::alloc::Layout;
use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::error;

// ============================================================================
// Main Error Types
// ============================================================================

/// Memory substrate errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    // --- Allocation Errors ---
    #[error("Memory allocation failed: {size} bytes with {align} byte alignment")]
    AllocationFailed { size: usize, align: usize },

    #[error("Size overflow during operation: {operation}")]
    SizeOverflow { operation: String },

    #[error("Invalid alignment: {alignment}")]
    InvalidAlignment { alignment: usize },

    #[error("Allocation exceeds maximum size: {size} bytes (max: {max_size})")]
    ExceedsMaxSize { size: usize, max_size: usize },

    // --- Resource Errors ---
    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("Operation not supported for element type {type_name}: {operation}")]
    NotSupported {
        operation: &'static str,
        type_name: &'static str,
    },

    // --- Configuration Errors ---
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl MemoryError {
    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AllocationFailed { .. } => "MEM:ALLOC:FAILED",
            Self::SizeOverflow { .. } => "MEM:ALLOC:OVERFLOW",
            Self::InvalidAlignment { .. } => "MEM:ALLOC:ALIGN",
            Self::ExceedsMaxSize { .. } => "MEM:ALLOC:MAX",
            Self::InvalidState { .. } => "MEM:SYSTEM:STATE",
            Self::NotSupported { .. } => "MEM:FEATURE:UNSUPPORTED",
            Self::InvalidConfig { .. } => "MEM:CONFIG:INVALID",
        }
    }

    // ============================================================================
    // Convenience Constructors - Allocation Errors
    // ============================================================================

    /// Create allocation failed error
    pub fn allocation_failed(size: usize, align: usize) -> Self {
        #[cfg(feature = "logging")]
        error!(size, align, "memory allocation failed");

        Self::AllocationFailed { size, align }
    }

    /// Create allocation failed error from layout
    pub fn allocation_failed_with_layout(layout: Layout) -> Self {
        Self::allocation_failed(layout.size(), layout.align())
    }

    /// Create size overflow error
    pub fn size_overflow(operation: &str) -> Self {
        Self::SizeOverflow {
            operation: operation.to_string(),
        }
    }

    /// Create invalid alignment error
    pub fn invalid_alignment(alignment: usize) -> Self {
        Self::InvalidAlignment { alignment }
    }

    /// Create allocation too large error
    pub fn allocation_too_large(size: usize, max_size: usize) -> Self {
        Self::ExceedsMaxSize { size, max_size }
    }

    // --- Resource Errors ---

    /// Create invalid state error
    pub fn invalid_state(reason: &str) -> Self {
        Self::InvalidState {
            reason: reason.to_string(),
        }
    }

    /// Create not supported error for an erased element type
    pub fn not_supported(operation: &'static str, type_name: &'static str) -> Self {
        Self::NotSupported {
            operation,
            type_name,
        }
    }

    // --- Configuration Errors ---

    /// Create invalid config error
    pub fn invalid_config(reason: &str) -> Self {
        Self::InvalidConfig {
            reason: reason.to_string(),
        }
    }

    /// Check if this is an allocation failure
    #[must_use]
    pub fn is_allocation_failure(&self) -> bool {
        matches!(self, Self::AllocationFailed { .. })
    }

    /// Check if this is an invalid alignment error
    #[must_use]
    pub fn is_invalid_alignment(&self) -> bool {
        matches!(self, Self::InvalidAlignment { .. })
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for memory operations
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;

/// Generic result type alias
pub type Result<T> = MemoryResult<T>;

/// Type aliases for the allocator module
pub type AllocError = MemoryError;
pub type AllocResult<T> = MemoryResult<T>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_error_creation() {
        let error = MemoryError::allocation_failed(1024, 8);
        assert!(!error.to_string().is_empty());
        assert!(error.to_string().contains("1024"));
    }

    #[test]
    fn test_error_with_layout() {
        let layout = Layout::new::<u64>();
        let error = MemoryError::allocation_failed_with_layout(layout);
        assert!(error.to_string().contains(&layout.size().to_string()));
        assert!(error.is_allocation_failure());
    }

    #[test]
    fn test_not_supported_names_type() {
        let error = MemoryError::not_supported("copy", "alloc::string::String");
        assert!(error.to_string().contains("copy"));
        assert!(error.to_string().contains("String"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(MemoryError::allocation_failed(1024, 8).code(), "MEM:ALLOC:FAILED");
        assert_eq!(MemoryError::invalid_alignment(3).code(), "MEM:ALLOC:ALIGN");
        assert_eq!(MemoryError::invalid_state("busy").code(), "MEM:SYSTEM:STATE");
        assert_eq!(MemoryError::invalid_config("bad").code(), "MEM:CONFIG:INVALID");
        assert_eq!(MemoryError::size_overflow("grow").code(), "MEM:ALLOC:OVERFLOW");
        assert_eq!(MemoryError::allocation_too_large(64, 32).code(), "MEM:ALLOC:MAX");
        assert_eq!(
            MemoryError::not_supported("copy", "u8").code(),
            "MEM:FEATURE:UNSUPPORTED"
        );
    }
}
