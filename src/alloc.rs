use core::{
  alloc::Layout,
  cell::Cell,
  ptr::{self, NonNull, null_mut},
};
use std::rc::Rc;

use tracing::warn;

use crate::{
  ALIGN, FREE_LIST_COUNT, MAX_BYTES, REFILL_COUNT, align_up,
  error::AllocError,
  pool::{ChunkPool, os_alloc, os_alloc_aligned, os_free},
};

// =============================================================================
// Allocator trait
// =============================================================================

/// Byte-level allocator consumed by [`crate::TypedAllocator`] and the
/// containers.
///
/// Nothing about a block is remembered: `deallocate` must receive the layout
/// the block was allocated with.
///
/// # Safety
///
/// `allocate` must return memory valid for `layout`, owned by the caller until
/// it is handed back to `deallocate` of the same allocator.
pub unsafe trait RawAllocator {
  fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

  /// # Safety
  ///
  /// `ptr` came from `allocate(layout)` on this allocator and is not used
  /// afterwards.
  unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

  /// Moves a block to a block of `new_size` bytes, keeping the common prefix.
  ///
  /// # Safety
  ///
  /// Same contract as [`RawAllocator::deallocate`] for `ptr` and `old`.
  unsafe fn reallocate(
    &self,
    ptr: NonNull<u8>,
    old: Layout,
    new_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let new = Layout::from_size_align(new_size, old.align()).map_err(|_| AllocError::CapacityOverflow)?;
    let fresh = self.allocate(new)?;
    unsafe {
      ptr::copy_nonoverlapping(ptr.as_ptr(), fresh.as_ptr(), old.size().min(new_size));
      self.deallocate(ptr, old);
    }
    Ok(fresh)
  }

  /// Whether blocks allocated by `other` may be handed to `self`. Containers
  /// only move nodes between each other when this holds.
  ///
  /// The default only trusts the very same instance.
  #[inline]
  fn is_interchangeable(&self, other: &Self) -> bool {
    ptr::eq(self, other)
  }
}

unsafe impl<A: RawAllocator + ?Sized> RawAllocator for &A {
  #[inline]
  fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
    (**self).allocate(layout)
  }

  #[inline]
  unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
    unsafe { (**self).deallocate(ptr, layout) }
  }

  #[inline]
  unsafe fn reallocate(
    &self,
    ptr: NonNull<u8>,
    old: Layout,
    new_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    unsafe { (**self).reallocate(ptr, old, new_size) }
  }

  #[inline]
  fn is_interchangeable(&self, other: &Self) -> bool {
    (**self).is_interchangeable(*other)
  }
}

unsafe impl<A: RawAllocator + ?Sized> RawAllocator for Rc<A> {
  #[inline]
  fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
    (**self).allocate(layout)
  }

  #[inline]
  unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
    unsafe { (**self).deallocate(ptr, layout) }
  }

  #[inline]
  unsafe fn reallocate(
    &self,
    ptr: NonNull<u8>,
    old: Layout,
    new_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    unsafe { (**self).reallocate(ptr, old, new_size) }
  }

  #[inline]
  fn is_interchangeable(&self, other: &Self) -> bool {
    Rc::ptr_eq(self, other) || (**self).is_interchangeable(other)
  }
}

// =============================================================================
// Free cells
// =============================================================================

/// A pooled cell while it sits on a free list: its first word links to the
/// next free cell of the same class. Only valid as a link while on the list.
#[repr(C)]
struct FreeCell {
  next: *mut FreeCell,
}

const _: () = assert!(size_of::<FreeCell>() <= ALIGN);

impl FreeCell {
  #[inline]
  unsafe fn link(cell: NonNull<u8>, next: *mut FreeCell) -> *mut FreeCell {
    let cell = cell.as_ptr() as *mut FreeCell;
    unsafe { (*cell).next = next };
    cell
  }

  #[inline]
  unsafe fn next(cell: *mut FreeCell) -> *mut FreeCell {
    unsafe { (*cell).next }
  }
}

// =============================================================================
// Size classes
// =============================================================================

/// Class index for a pooled request. `0` shares the smallest class.
#[inline(always)]
pub(crate) const fn class_index(bytes: usize) -> usize {
  if bytes == 0 { 0 } else { (bytes + ALIGN - 1) / ALIGN - 1 }
}

/// Cell size of a class (inverse of `class_index`).
#[inline(always)]
pub(crate) const fn class_size(class: usize) -> usize {
  (class + 1) * ALIGN
}

const _: () = assert!(class_index(1) == 0);
const _: () = assert!(class_index(ALIGN) == 0);
const _: () = assert!(class_index(ALIGN + 1) == 1);
const _: () = assert!(class_index(MAX_BYTES) == FREE_LIST_COUNT - 1);
const _: () = assert!(class_size(FREE_LIST_COUNT - 1) == MAX_BYTES);

// =============================================================================
// Size-class allocator
// =============================================================================

/// Two-level allocator: requests up to [`MAX_BYTES`] are served from
/// per-class intrusive free lists refilled in batches of [`REFILL_COUNT`]
/// cells from a [`ChunkPool`]; larger or over-aligned requests go straight to
/// the system allocator.
///
/// Not thread-safe. Each instance is confined to the thread that created it;
/// see [`Global`] for the per-thread default instance.
///
/// Dropping the allocator hands every pool chunk back to the system, so
/// pooled blocks still outstanding at that point become invalid. Oversized
/// and over-aligned blocks are not tracked: any still outstanding are leaked
/// rather than freed. Borrowing containers (`&SizeClassAllocator`) cannot
/// outlive it; containers sharing it through `Rc` keep it alive until the
/// last clone drops.
pub struct SizeClassAllocator {
  free_lists: [Cell<*mut FreeCell>; FREE_LIST_COUNT],
  pool: ChunkPool,
}

impl Default for SizeClassAllocator {
  fn default() -> Self {
    Self::new()
  }
}

impl SizeClassAllocator {
  pub const fn new() -> Self {
    Self::build(None)
  }

  /// An allocator whose pool never requests more than `bytes` from the system
  /// in total. Oversized requests are not counted.
  pub const fn with_heap_limit(bytes: usize) -> Self {
    Self::build(Some(bytes))
  }

  const fn build(heap_limit: Option<usize>) -> Self {
    Self {
      free_lists: [const { Cell::new(null_mut()) }; FREE_LIST_COUNT],
      pool: ChunkPool::new(heap_limit),
    }
  }

  /// Bytes requested from the system for the pool so far. Never decreases.
  pub fn heap_size(&self) -> usize {
    self.pool.heap_size()
  }

  /// Bytes left in the pool's bump region.
  pub fn pool_slack(&self) -> usize {
    self.pool.slack()
  }

  /// Number of chunks the pool obtained from the system.
  pub fn chunk_count(&self) -> usize {
    self.pool.chunk_count()
  }

  /// Length of the free list serving `bytes`. Zero for oversized requests.
  pub fn free_cells(&self, bytes: usize) -> usize {
    if bytes > MAX_BYTES {
      return 0;
    }
    let mut cell = self.free_lists[class_index(bytes)].get();
    let mut count = 0;
    while !cell.is_null() {
      count += 1;
      cell = unsafe { FreeCell::next(cell) };
    }
    count
  }

  pub fn allocate(&self, bytes: usize) -> Result<NonNull<u8>, AllocError> {
    if bytes > MAX_BYTES {
      let ptr = unsafe { os_alloc(bytes) };
      return NonNull::new(ptr).ok_or(AllocError::System { size: bytes, align: ALIGN });
    }

    let class = class_index(bytes);
    match self.pop(class) {
      Some(cell) => Ok(cell),
      None => self.refill(class_size(class)),
    }
  }

  /// # Safety
  ///
  /// `ptr` came from `allocate(bytes)` on this allocator, with the same
  /// `bytes`. A different size corrupts the free lists.
  pub unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize) {
    if bytes > MAX_BYTES {
      unsafe { os_free(ptr.as_ptr()) };
      return;
    }

    let class = class_index(bytes);
    #[cfg(feature = "poison-free")]
    unsafe {
      let link = size_of::<FreeCell>();
      ptr::write_bytes(ptr.as_ptr().add(link), 0xDD, class_size(class) - link);
    }
    unsafe { self.push(class, ptr) };
  }

  /// Resizes a block, keeping `min(old, new)` bytes. Stays in place when both
  /// sizes map to the same class.
  ///
  /// # Safety
  ///
  /// Same contract as [`SizeClassAllocator::deallocate`] for `ptr` and `old`.
  pub unsafe fn reallocate(
    &self,
    ptr: NonNull<u8>,
    old: usize,
    new: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if old > MAX_BYTES && new > MAX_BYTES {
      let moved = unsafe { libc::realloc(ptr.as_ptr().cast(), new) } as *mut u8;
      return NonNull::new(moved).ok_or(AllocError::System { size: new, align: ALIGN });
    }
    if old <= MAX_BYTES && new <= MAX_BYTES && class_index(old) == class_index(new) {
      return Ok(ptr);
    }

    let fresh = self.allocate(new)?;
    unsafe {
      ptr::copy_nonoverlapping(ptr.as_ptr(), fresh.as_ptr(), old.min(new));
      self.deallocate(ptr, old);
    }
    Ok(fresh)
  }

  #[inline]
  fn pop(&self, class: usize) -> Option<NonNull<u8>> {
    let head = self.free_lists[class].get();
    let cell = NonNull::new(head)?;
    self.free_lists[class].set(unsafe { FreeCell::next(head) });
    Some(cell.cast())
  }

  #[inline]
  unsafe fn push(&self, class: usize, cell: NonNull<u8>) {
    let head = unsafe { FreeCell::link(cell, self.free_lists[class].get()) };
    self.free_lists[class].set(head);
  }

  /// Returns one cell of `size` bytes and threads the rest of the batch onto
  /// the class free list.
  #[inline(never)]
  fn refill(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
    let mut count = REFILL_COUNT;
    let chunk = self.chunk_alloc(size, &mut count)?;
    if count == 1 {
      return Ok(chunk);
    }

    // Link back to front so the list hands cells out in address order.
    let class = class_index(size);
    for i in (1..count).rev() {
      let cell = unsafe { NonNull::new_unchecked(chunk.as_ptr().add(i * size)) };
      unsafe { self.push(class, cell) };
    }
    Ok(chunk)
  }

  /// Carves up to `count` cells of `size` bytes from the pool, lowering
  /// `count` to what was actually obtained.
  fn chunk_alloc(&self, size: usize, count: &mut usize) -> Result<NonNull<u8>, AllocError> {
    loop {
      let total = size * *count;
      let left = self.pool.slack();

      if left >= total {
        return Ok(self.pool.carve(total));
      }
      if left >= size {
        *count = left / size;
        return Ok(self.pool.carve(*count * size));
      }

      // Not even one cell: the leftover is smaller than `size`, so it belongs
      // to a smaller class.
      if let Some((leftover, bytes)) = self.pool.take_leftover() {
        unsafe { self.push(class_index(bytes), leftover) };
      }

      let request = self.pool.growth_for(total);
      if self.pool.grow(request) {
        continue;
      }

      warn!(request, size, "pool growth failed, reclaiming a larger free cell");
      let mut reclaimed = false;
      for class in class_index(size)..FREE_LIST_COUNT {
        if let Some(cell) = self.pop(class) {
          self.pool.adopt(cell, class_size(class));
          reclaimed = true;
          break;
        }
      }
      if !reclaimed {
        warn!(requested = total, heap_size = self.pool.heap_size(), "size-class pool exhausted");
        return Err(AllocError::PoolExhausted { requested: total });
      }
    }
  }

  fn allocate_layout(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
    if layout.align() <= ALIGN {
      return self.allocate(layout.size());
    }
    let size = align_up(layout.size().max(1), layout.align());
    let ptr = unsafe { os_alloc_aligned(size, layout.align()) };
    NonNull::new(ptr).ok_or(AllocError::System { size, align: layout.align() })
  }

  unsafe fn deallocate_layout(&self, ptr: NonNull<u8>, layout: Layout) {
    if layout.align() <= ALIGN {
      unsafe { self.deallocate(ptr, layout.size()) };
    } else {
      unsafe { os_free(ptr.as_ptr()) };
    }
  }
}

unsafe impl RawAllocator for SizeClassAllocator {
  #[inline]
  fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
    self.allocate_layout(layout)
  }

  #[inline]
  unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
    unsafe { self.deallocate_layout(ptr, layout) }
  }

  unsafe fn reallocate(
    &self,
    ptr: NonNull<u8>,
    old: Layout,
    new_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if old.align() <= ALIGN {
      return unsafe { SizeClassAllocator::reallocate(self, ptr, old.size(), new_size) };
    }
    let new = Layout::from_size_align(new_size, old.align()).map_err(|_| AllocError::CapacityOverflow)?;
    let fresh = self.allocate_layout(new)?;
    unsafe {
      ptr::copy_nonoverlapping(ptr.as_ptr(), fresh.as_ptr(), old.size().min(new_size));
      os_free(ptr.as_ptr());
    }
    Ok(fresh)
  }
}

// =============================================================================
// Per-thread default instance
// =============================================================================

thread_local! {
  // Leaked: pooled cells may still be referenced while TLS is torn down.
  static HEAP: &'static SizeClassAllocator = Box::leak(Box::new(SizeClassAllocator::new()));
}

/// Handle to the calling thread's [`SizeClassAllocator`]. Default allocator of
/// every container in this crate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Global;

impl Global {
  /// Runs `f` against the calling thread's allocator.
  pub fn with<R>(f: impl FnOnce(&SizeClassAllocator) -> R) -> R {
    HEAP.with(|heap| f(heap))
  }

  fn heap() -> Option<&'static SizeClassAllocator> {
    HEAP.try_with(|heap| *heap).ok()
  }
}

unsafe impl RawAllocator for Global {
  #[inline]
  fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
    match Global::heap() {
      Some(heap) => heap.allocate_layout(layout),
      None => Err(AllocError::System { size: layout.size(), align: layout.align() }),
    }
  }

  #[inline]
  unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
    // During TLS teardown the block is leaked; the pool is never freed anyway.
    if let Some(heap) = Global::heap() {
      unsafe { heap.deallocate_layout(ptr, layout) };
    }
  }

  unsafe fn reallocate(
    &self,
    ptr: NonNull<u8>,
    old: Layout,
    new_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    match Global::heap() {
      Some(heap) => unsafe { RawAllocator::reallocate(heap, ptr, old, new_size) },
      None => Err(AllocError::System { size: new_size, align: old.align() }),
    }
  }

  /// Every handle on a thread refers to the same heap.
  #[inline]
  fn is_interchangeable(&self, _other: &Self) -> bool {
    true
  }
}
