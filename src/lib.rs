//! Size-class pooled allocator and the containers built on it.
//!
//! ```text
//!   Deque / Vector / List
//!        │  element counts
//!        ▼
//!   TypedAllocator<T>
//!        │  bytes
//!        ▼
//!   SizeClassAllocator ──── > MAX_BYTES or over-aligned ───▶ libc malloc
//!        │  empty free list
//!        ▼
//!   ChunkPool (bump region over system chunks)
//! ```
//!
//! Everything here is single-threaded by contract. The default allocator,
//! [`Global`], is one leaked [`SizeClassAllocator`] per thread.

#![allow(clippy::missing_safety_doc)]

mod alloc;
mod deque;
mod error;
pub mod list;
mod pool;
mod typed;
mod vector;

pub use alloc::{Global, RawAllocator, SizeClassAllocator};
pub use deque::{BUFFER_SIZE, Cursor, Deque, IntoIter, Iter, IterMut};
pub use error::AllocError;
pub use list::{CursorMut, List};
pub use typed::TypedAllocator;
pub use vector::Vector;

// =============================================================================
// Constants
// =============================================================================

/// Size-class granularity. Every pooled cell is aligned to it.
pub const ALIGN: usize = 8;

/// Largest request served from a size class.
pub const MAX_BYTES: usize = 128;

/// Number of size classes (`8, 16, ..., 128`).
pub const FREE_LIST_COUNT: usize = MAX_BYTES / ALIGN;

/// Cells requested from the pool each time a free list runs dry.
pub const REFILL_COUNT: usize = 20;

// =============================================================================
// Compile-Time Assertions
// =============================================================================

const _: () = assert!(ALIGN.is_power_of_two());
const _: () = assert!(ALIGN >= size_of::<usize>());
const _: () = assert!(MAX_BYTES % ALIGN == 0);
const _: () = assert!(REFILL_COUNT >= 1);

// =============================================================================
// Utils
// =============================================================================

/// Rounds `x` up to the next multiple of alignment `align`. Alignment must be a power of 2.
#[inline(always)]
pub(crate) const fn align_up(x: usize, align: usize) -> usize {
  let mask = align - 1;
  (x + mask) & !mask
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align_up() {
    for i in 0..10 {
      for size in (ALIGN * i + 1)..=(ALIGN * (i + 1)) {
        assert_eq!(align_up(size, ALIGN), ALIGN * (i + 1));
      }
    }
    assert_eq!(align_up(0, ALIGN), 0);
  }
}
