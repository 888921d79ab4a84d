use core::{alloc::Layout, marker::PhantomData, ptr::NonNull};

use crate::{alloc::RawAllocator, error::AllocError};

/// Typed view over a [`RawAllocator`]: element counts in, uninitialized
/// element storage out.
///
/// The count is not remembered. `deallocate` must get the count `allocate`
/// was called with.
pub struct TypedAllocator<'a, T, A: RawAllocator + ?Sized> {
  raw: &'a A,
  _marker: PhantomData<fn() -> T>,
}

impl<T, A: RawAllocator + ?Sized> Clone for TypedAllocator<'_, T, A> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<T, A: RawAllocator + ?Sized> Copy for TypedAllocator<'_, T, A> {}

impl<'a, T, A: RawAllocator + ?Sized> TypedAllocator<'a, T, A> {
  pub fn new(raw: &'a A) -> Self {
    Self { raw, _marker: PhantomData }
  }

  #[inline]
  fn layout(n: usize) -> Result<Layout, AllocError> {
    Layout::array::<T>(n).map_err(|_| AllocError::CapacityOverflow)
  }

  /// Storage for `n` elements, uninitialized.
  pub fn allocate(&self, n: usize) -> Result<NonNull<T>, AllocError> {
    let layout = Self::layout(n)?;
    self.raw.allocate(layout).map(NonNull::cast)
  }

  /// # Safety
  ///
  /// `ptr` came from `allocate(n)` of an allocator sharing this raw allocator,
  /// with the same `n`. Elements must already be destroyed.
  pub unsafe fn deallocate(&self, ptr: NonNull<T>, n: usize) {
    // `allocate(n)` succeeded, so the layout is valid.
    let Ok(layout) = Self::layout(n) else { return };
    unsafe { self.raw.deallocate(ptr.cast(), layout) };
  }

  /// Moves storage for `old_n` elements to storage for `new_n`, keeping the
  /// first `min(old_n, new_n)` slots bitwise.
  ///
  /// # Safety
  ///
  /// Same contract as [`TypedAllocator::deallocate`] for `ptr` and `old_n`.
  pub unsafe fn reallocate(
    &self,
    ptr: NonNull<T>,
    old_n: usize,
    new_n: usize,
  ) -> Result<NonNull<T>, AllocError> {
    let old = Self::layout(old_n)?;
    let new = Self::layout(new_n)?;
    unsafe { self.raw.reallocate(ptr.cast(), old, new.size()) }.map(NonNull::cast)
  }

  /// # Safety
  ///
  /// `ptr` is valid for writes and holds no live value.
  #[inline]
  pub unsafe fn construct(&self, ptr: NonNull<T>, value: T) {
    unsafe { ptr.as_ptr().write(value) };
  }

  /// # Safety
  ///
  /// Same as [`TypedAllocator::construct`].
  #[inline]
  pub unsafe fn construct_default(&self, ptr: NonNull<T>)
  where
    T: Default,
  {
    unsafe { ptr.as_ptr().write(T::default()) };
  }

  /// Runs the destructor, keeps the storage.
  ///
  /// # Safety
  ///
  /// `ptr` holds a live value that is not used afterwards.
  #[inline]
  pub unsafe fn destroy(&self, ptr: NonNull<T>) {
    unsafe { ptr.as_ptr().drop_in_place() };
  }

  /// Destroys every value in `[first, last)` of one contiguous block.
  ///
  /// # Safety
  ///
  /// Same as [`TypedAllocator::destroy`] for each slot; `last` is not before
  /// `first` in the same block.
  pub unsafe fn destroy_range(&self, first: NonNull<T>, last: NonNull<T>) {
    let len = unsafe { last.offset_from(first) };
    debug_assert!(len >= 0);
    let slice = core::ptr::slice_from_raw_parts_mut(first.as_ptr(), len as usize);
    unsafe { slice.drop_in_place() };
  }
}
