use core::{
  cell::Cell,
  mem::size_of,
  ptr::{NonNull, null_mut},
};

use tracing::debug;

use crate::align_up;

// =============================================================================
// Platform
// =============================================================================

pub(crate) unsafe fn os_alloc(size: usize) -> *mut u8 {
  unsafe { libc::malloc(size) as *mut u8 }
}

pub(crate) unsafe fn os_alloc_aligned(size: usize, align: usize) -> *mut u8 {
  // posix_memalign wants at least pointer alignment.
  let align = align.max(size_of::<*mut u8>());
  let mut out: *mut libc::c_void = null_mut();
  let rc = unsafe { libc::posix_memalign(&mut out, align, size) };
  if rc != 0 { null_mut() } else { out as *mut u8 }
}

pub(crate) unsafe fn os_free(ptr: *mut u8) {
  unsafe { libc::free(ptr.cast()) };
}

// =============================================================================
// Chunk pool
// =============================================================================

/// Sits at offset 0 of every chunk obtained from the system.
#[repr(C)]
struct ChunkHeader {
  next: *mut ChunkHeader,
  size: usize,
}

const CHUNK_HEADER_SIZE: usize = size_of::<ChunkHeader>();

const _: () = assert!(CHUNK_HEADER_SIZE % crate::ALIGN == 0);

/// Bump region `[start, end)` carved out of chunks obtained from the system.
///
/// The pool only ever grows: `heap_size` counts every byte requested from the
/// system and is never decremented. Cells carved from it are handed to the
/// size-class free lists and never returned here.
pub(crate) struct ChunkPool {
  start: Cell<*mut u8>,
  end: Cell<*mut u8>,
  heap_size: Cell<usize>,
  /// Every system chunk, so an explicit allocator can release them on drop.
  chunks: Cell<*mut ChunkHeader>,
  chunk_count: Cell<usize>,
  heap_limit: Option<usize>,
}

impl ChunkPool {
  pub(crate) const fn new(heap_limit: Option<usize>) -> Self {
    Self {
      start: Cell::new(null_mut()),
      end: Cell::new(null_mut()),
      heap_size: Cell::new(0),
      chunks: Cell::new(null_mut()),
      chunk_count: Cell::new(0),
      heap_limit,
    }
  }

  #[inline]
  pub(crate) fn slack(&self) -> usize {
    self.end.get() as usize - self.start.get() as usize
  }

  #[inline]
  pub(crate) fn heap_size(&self) -> usize {
    self.heap_size.get()
  }

  #[inline]
  pub(crate) fn chunk_count(&self) -> usize {
    self.chunk_count.get()
  }

  /// Bump `bytes` off the front of the region. Caller checked `slack()`.
  #[inline]
  pub(crate) fn carve(&self, bytes: usize) -> NonNull<u8> {
    debug_assert!(bytes <= self.slack());
    let start = self.start.get();
    self.start.set(start.wrapping_add(bytes));
    // SAFETY: a non-empty region never starts at null.
    unsafe { NonNull::new_unchecked(start) }
  }

  /// Empties the region, returning what was left in it.
  pub(crate) fn take_leftover(&self) -> Option<(NonNull<u8>, usize)> {
    let left = self.slack();
    let start = self.start.get();
    self.start.set(self.end.get());
    NonNull::new(start).filter(|_| left > 0).map(|p| (p, left))
  }

  /// Next system request: twice the batch, or a slice proportional to what
  /// has been requested so far once the heap is large.
  #[inline]
  pub(crate) fn growth_for(&self, batch: usize) -> usize {
    (2 * batch).max(align_up(self.heap_size.get() >> 4, crate::ALIGN))
  }

  /// Replaces the (empty) region with a fresh system chunk of `bytes`.
  /// Returns `false` when the system refuses or the heap limit would be crossed.
  pub(crate) fn grow(&self, bytes: usize) -> bool {
    debug_assert_eq!(self.slack(), 0);
    let heap = self.heap_size.get();
    if let Some(limit) = self.heap_limit
      && heap.saturating_add(bytes) > limit
    {
      return false;
    }
    let Some(total) = bytes.checked_add(CHUNK_HEADER_SIZE) else {
      return false;
    };

    let raw = unsafe { os_alloc(total) };
    if raw.is_null() {
      return false;
    }

    let chunk = raw as *mut ChunkHeader;
    unsafe {
      (*chunk).next = self.chunks.get();
      (*chunk).size = total;
    }
    self.chunks.set(chunk);
    self.chunk_count.set(self.chunk_count.get() + 1);

    let start = unsafe { raw.add(CHUNK_HEADER_SIZE) };
    self.start.set(start);
    self.end.set(unsafe { start.add(bytes) });
    self.heap_size.set(heap + bytes);
    debug!(bytes, heap_size = heap + bytes, "chunk pool grew");
    true
  }

  /// Makes `[cell, cell + size)` the region. The cell must come from this pool.
  pub(crate) fn adopt(&self, cell: NonNull<u8>, size: usize) {
    debug_assert_eq!(self.slack(), 0);
    self.start.set(cell.as_ptr());
    self.end.set(cell.as_ptr().wrapping_add(size));
  }
}

// Cells carved from a chunk die with it.
impl Drop for ChunkPool {
  fn drop(&mut self) {
    let mut chunk = self.chunks.get();
    while !chunk.is_null() {
      let next = unsafe { (*chunk).next };
      unsafe { os_free(chunk as *mut u8) };
      chunk = next;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn grow_and_carve() {
    let pool = ChunkPool::new(None);
    assert_eq!(pool.slack(), 0);
    assert!(pool.take_leftover().is_none());

    assert!(pool.grow(320));
    assert_eq!(pool.heap_size(), 320);
    assert_eq!(pool.chunk_count(), 1);

    let a = pool.carve(160);
    let b = pool.carve(80);
    assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 160);
    assert_eq!(a.as_ptr() as usize % crate::ALIGN, 0);
    assert_eq!(pool.slack(), 80);

    let (left, size) = pool.take_leftover().unwrap();
    assert_eq!(size, 80);
    assert_eq!(left.as_ptr() as usize - b.as_ptr() as usize, 80);
    assert_eq!(pool.slack(), 0);
  }

  #[test]
  fn heap_limit_refuses_growth() {
    let pool = ChunkPool::new(Some(1000));
    assert!(pool.grow(640));
    pool.take_leftover();
    assert!(!pool.grow(640));
    assert_eq!(pool.heap_size(), 640);
    assert!(pool.grow(360));
    assert_eq!(pool.heap_size(), 1000);
  }

  #[test]
  fn growth_is_proportional_once_heap_is_large() {
    let pool = ChunkPool::new(None);
    assert_eq!(pool.growth_for(160), 320);
    assert!(pool.grow(64 * 1024));
    pool.take_leftover();
    assert_eq!(pool.growth_for(160), 4096);
  }
}
