//! Recycling allocator for small integer handles
//!
//! [`IndexAllocator`] hands out integer handles for pooled resources. Fresh
//! handles come from a monotonically increasing counter; freed handles go to
//! a free list and are reused most-recently-freed first. The high-water mark
//! never shrinks.

use core::fmt;
use core::hash::Hash;

use crate::config::IndexConfig;
use crate::error::{MemoryError, MemoryResult};

/// Unsigned integer usable as a handle
pub trait Index: Copy + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
    const ZERO: Self;
    const ONE: Self;

    fn checked_add(self, rhs: Self) -> Option<Self>;

    fn checked_sub(self, rhs: Self) -> Option<Self>;

    fn try_from_usize(value: usize) -> Option<Self>;
}

macro_rules! impl_index {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Index for $ty {
                const ZERO: Self = 0;
                const ONE: Self = 1;

                #[inline]
                fn checked_add(self, rhs: Self) -> Option<Self> {
                    <$ty>::checked_add(self, rhs)
                }

                #[inline]
                fn checked_sub(self, rhs: Self) -> Option<Self> {
                    <$ty>::checked_sub(self, rhs)
                }

                #[inline]
                fn try_from_usize(value: usize) -> Option<Self> {
                    <$ty>::try_from(value).ok()
                }
            }
        )*
    };
}

impl_index!(u16, u32, u64, usize);

/// Free-list backed pool of reusable integer handles
///
/// Freeing a handle that is not live, or freeing one twice without an
/// intervening allocation, is a caller error. Debug builds assert on both;
/// release builds do not check.
///
/// # Examples
///
/// ```
/// use nebula_alloc::index::IndexAllocator;
///
/// let mut ids = IndexAllocator::<u32>::new();
/// let a = ids.allocate_index()?;
/// let b = ids.allocate_index()?;
/// assert_eq!((a, b), (0, 1));
///
/// ids.free_index(a);
/// assert_eq!(ids.allocate_index()?, 0);
/// assert_eq!(ids.allocate_index()?, 2);
/// # Ok::<(), nebula_alloc::MemoryError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexAllocator<I: Index = u32> {
    free: Vec<I>,
    next: I,
    base: I,
    live: usize,
}

impl<I: Index> IndexAllocator<I> {
    /// Pool whose first handle is zero
    pub const fn new() -> Self {
        Self::with_offset(I::ZERO)
    }

    /// Pool whose first handle is `offset`
    pub const fn with_offset(offset: I) -> Self {
        Self {
            free: Vec::new(),
            next: offset,
            base: offset,
            live: 0,
        }
    }

    /// Pool built from configuration, with `config.reserve` handles
    /// pre-populated on the free list
    pub fn with_config(config: &IndexConfig) -> MemoryResult<Self> {
        config.validate()?;

        let offset = I::try_from_usize(config.offset)
            .ok_or_else(|| MemoryError::invalid_config("index offset exceeds handle width"))?;
        let reserve = I::try_from_usize(config.reserve)
            .ok_or_else(|| MemoryError::invalid_config("index reserve exceeds handle width"))?;

        let mut pool = Self::with_offset(offset);
        pool.reserve_indices(reserve, offset)?;

        #[cfg(feature = "logging")]
        tracing::debug!(
            offset = config.offset,
            reserve = config.reserve,
            "index allocator configured"
        );

        Ok(pool)
    }

    /// Next handle: the most recently freed one if any, else a fresh one
    ///
    /// Fails only when the handle type has no fresh values left. The
    /// largest value of `I` is never issued, so the high-water mark stays
    /// representable.
    #[inline]
    pub fn allocate_index(&mut self) -> MemoryResult<I> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = self.next;
                self.next = index
                    .checked_add(I::ONE)
                    .ok_or_else(|| MemoryError::size_overflow("index allocation"))?;
                index
            }
        };
        self.live += 1;
        Ok(index)
    }

    /// Returns `index` to the pool
    #[inline]
    pub fn free_index(&mut self, index: I) {
        debug_assert!(
            index >= self.base && index < self.next,
            "freeing index {index} that was never issued"
        );
        debug_assert!(!self.free.contains(&index), "index {index} freed twice");

        self.free.push(index);
        self.live = self.live.saturating_sub(1);
    }

    /// Puts `capacity` handles starting at `offset` on the free list
    ///
    /// They are handed out in ascending order before any fresh handle. The
    /// range must not overlap handles already issued.
    pub fn reserve_indices(&mut self, capacity: I, offset: I) -> MemoryResult<()> {
        if capacity == I::ZERO {
            return Ok(());
        }
        debug_assert!(
            offset >= self.next,
            "reserved range starting at {offset} overlaps issued indices"
        );

        let end = offset
            .checked_add(capacity)
            .ok_or_else(|| MemoryError::size_overflow("index reservation"))?;

        let mut index = end;
        while index > offset {
            index = index
                .checked_sub(I::ONE)
                .ok_or_else(|| MemoryError::size_overflow("index reservation"))?;
            self.free.push(index);
        }

        if end > self.next {
            self.next = end;
        }
        Ok(())
    }

    /// Number of handles currently out
    pub const fn len(&self) -> usize {
        self.live
    }

    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// One past the largest handle ever introduced
    pub const fn high_water_mark(&self) -> I {
        self.next
    }

    /// Handles waiting on the free list
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Forgets every handle and starts again from the initial offset
    pub fn clear(&mut self) {
        self.free.clear();
        self.next = self.base;
        self.live = 0;
    }
}

impl<I: Index> Default for IndexAllocator<I> {
    fn default() -> Self {
        Self::new()
    }
}
