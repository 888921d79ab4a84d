use core::{
  fmt,
  mem::ManuallyDrop,
  ops::{Deref, DerefMut},
  ptr::{self, NonNull},
  slice,
};

use crate::{
  alloc::{Global, RawAllocator},
  error::AllocError,
  typed::TypedAllocator,
};

/// Contiguous growable array over a [`RawAllocator`].
///
/// Capacity doubles on growth. A vector with capacity 0 owns no storage.
pub struct Vector<T, A: RawAllocator = Global> {
  ptr: NonNull<T>,
  cap: usize,
  len: usize,
  alloc: A,
}

impl<T> Vector<T> {
  pub fn new() -> Self {
    Self::new_in(Global)
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self::with_capacity_in(capacity, Global)
  }
}

impl<T> Default for Vector<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T, A: RawAllocator> Vector<T, A> {
  pub fn new_in(alloc: A) -> Self {
    const { assert!(size_of::<T>() != 0, "zero-sized elements are not supported") };
    Self { ptr: NonNull::dangling(), cap: 0, len: 0, alloc }
  }

  pub fn with_capacity_in(capacity: usize, alloc: A) -> Self {
    let mut vector = Self::new_in(alloc);
    vector.reserve(capacity);
    vector
  }

  /// Reassembles a vector from [`Vector::into_raw_parts_with_alloc`].
  ///
  /// # Safety
  ///
  /// `ptr` holds `capacity` slots allocated through `alloc` (or is dangling
  /// with `capacity == 0`), and the first `length` of them are initialized.
  pub unsafe fn from_raw_parts_in(ptr: NonNull<T>, length: usize, capacity: usize, alloc: A) -> Self {
    debug_assert!(length <= capacity);
    Self { ptr, cap: capacity, len: length, alloc }
  }

  /// Gives up ownership of the storage: pointer, length, capacity and the
  /// allocator it came from.
  pub fn into_raw_parts_with_alloc(self) -> (NonNull<T>, usize, usize, A) {
    let this = ManuallyDrop::new(self);
    (this.ptr, this.len, this.cap, unsafe { ptr::read(&this.alloc) })
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.len
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.cap
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn allocator(&self) -> &A {
    &self.alloc
  }

  /// # Safety
  ///
  /// `len <= capacity()`, and the first `len` slots are initialized.
  #[inline]
  pub unsafe fn set_len(&mut self, len: usize) {
    debug_assert!(len <= self.cap);
    self.len = len;
  }

  #[inline]
  pub fn as_ptr(&self) -> *const T {
    self.ptr.as_ptr()
  }

  #[inline]
  pub fn as_mut_ptr(&mut self) -> *mut T {
    self.ptr.as_ptr()
  }

  #[inline]
  fn typed(&self) -> TypedAllocator<'_, T, A> {
    TypedAllocator::new(&self.alloc)
  }

  /// Moves the elements to storage for exactly `cap` elements.
  fn set_capacity(&mut self, cap: usize) -> Result<(), AllocError> {
    debug_assert!(cap >= self.len);
    let ptr = match (self.cap, cap) {
      (0, 0) => return Ok(()),
      (0, _) => self.typed().allocate(cap)?,
      (old, 0) => {
        unsafe { self.typed().deallocate(self.ptr, old) };
        NonNull::dangling()
      }
      (old, _) => unsafe { self.typed().reallocate(self.ptr, old, cap)? },
    };
    self.ptr = ptr;
    self.cap = cap;
    Ok(())
  }

  pub fn reserve(&mut self, additional: usize) {
    self.try_reserve(additional).unwrap_or_else(|err| err.handle())
  }

  /// Makes room for at least `additional` more elements, growing to
  /// `max(2 * capacity, len + additional, 1)`.
  pub fn try_reserve(&mut self, additional: usize) -> Result<(), AllocError> {
    let needed = self.len.checked_add(additional).ok_or(AllocError::CapacityOverflow)?;
    if needed <= self.cap {
      return Ok(());
    }
    let cap = self.cap.saturating_mul(2).max(needed).max(1);
    self.set_capacity(cap)
  }

  pub fn shrink_to_fit(&mut self) {
    self.try_shrink_to_fit().unwrap_or_else(|err| err.handle())
  }

  /// Moves the elements to storage for exactly `len` elements. On failure
  /// the vector keeps its current storage.
  pub fn try_shrink_to_fit(&mut self) -> Result<(), AllocError> {
    if self.cap > self.len { self.set_capacity(self.len) } else { Ok(()) }
  }

  pub fn push(&mut self, value: T) {
    self.try_push(value).unwrap_or_else(|err| err.handle())
  }

  pub fn try_push(&mut self, value: T) -> Result<(), AllocError> {
    if self.len == self.cap {
      self.try_reserve(1)?;
    }
    unsafe { self.typed().construct(self.ptr.add(self.len), value) };
    self.len += 1;
    Ok(())
  }

  pub fn pop(&mut self) -> Option<T> {
    if self.len == 0 {
      return None;
    }
    self.len -= 1;
    Some(unsafe { self.ptr.add(self.len).read() })
  }

  /// Inserts `value` at `index`, shifting the tail right.
  ///
  /// # Panics
  ///
  /// If `index > len`.
  pub fn insert(&mut self, index: usize, value: T) {
    self.try_insert(index, value).unwrap_or_else(|err| err.handle())
  }

  /// # Panics
  ///
  /// If `index > len`.
  pub fn try_insert(&mut self, index: usize, value: T) -> Result<(), AllocError> {
    let len = self.len;
    if index > len {
      panic!("insertion index (is {index}) should be <= len (is {len})");
    }
    if len == self.cap {
      self.try_reserve(1)?;
    }
    unsafe {
      let at = self.ptr.add(index);
      ptr::copy(at.as_ptr(), at.as_ptr().add(1), len - index);
      self.typed().construct(at, value);
    }
    self.len += 1;
    Ok(())
  }

  /// Removes and returns the element at `index`, shifting the tail left.
  ///
  /// # Panics
  ///
  /// If `index >= len`.
  pub fn remove(&mut self, index: usize) -> T {
    let len = self.len;
    if index >= len {
      panic!("removal index (is {index}) should be < len (is {len})");
    }
    unsafe {
      let at = self.ptr.add(index);
      let value = at.read();
      ptr::copy(at.as_ptr().add(1), at.as_ptr(), len - index - 1);
      self.len -= 1;
      value
    }
  }

  /// Drops everything past the first `len` elements. Capacity is kept.
  pub fn truncate(&mut self, len: usize) {
    if len >= self.len {
      return;
    }
    let tail = self.len - len;
    // Shorten first so a panicking destructor cannot cause a double drop.
    self.len = len;
    unsafe {
      let first = self.ptr.add(len);
      self.typed().destroy_range(first, first.add(tail));
    }
  }

  pub fn clear(&mut self) {
    self.truncate(0);
  }

  /// Appends every item of `iter`. Items pushed before a failure stay.
  pub fn try_extend<I: IntoIterator<Item = T>>(&mut self, iter: I) -> Result<(), AllocError> {
    let iter = iter.into_iter();
    self.try_reserve(iter.size_hint().0)?;
    for value in iter {
      self.try_push(value)?;
    }
    Ok(())
  }

  pub fn as_slice(&self) -> &[T] {
    unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
  }

  pub fn as_mut_slice(&mut self) -> &mut [T] {
    unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
  }
}

impl<T, A: RawAllocator> Drop for Vector<T, A> {
  fn drop(&mut self) {
    self.clear();
    if self.cap > 0 {
      unsafe { self.typed().deallocate(self.ptr, self.cap) };
    }
  }
}

impl<T, A: RawAllocator> Deref for Vector<T, A> {
  type Target = [T];

  fn deref(&self) -> &[T] {
    self.as_slice()
  }
}

impl<T, A: RawAllocator> DerefMut for Vector<T, A> {
  fn deref_mut(&mut self) -> &mut [T] {
    self.as_mut_slice()
  }
}

impl<T: Clone, A: RawAllocator + Clone> Clone for Vector<T, A> {
  fn clone(&self) -> Self {
    let mut out = Self::with_capacity_in(self.len, self.alloc.clone());
    out.extend(self.iter().cloned());
    out
  }
}

impl<T: fmt::Debug, A: RawAllocator> fmt::Debug for Vector<T, A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(self.as_slice(), f)
  }
}

impl<T: PartialEq, A: RawAllocator, B: RawAllocator> PartialEq<Vector<T, B>> for Vector<T, A> {
  fn eq(&self, other: &Vector<T, B>) -> bool {
    self.as_slice() == other.as_slice()
  }
}

impl<T: Eq, A: RawAllocator> Eq for Vector<T, A> {}

impl<T> FromIterator<T> for Vector<T> {
  fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
    let mut vector = Vector::new();
    vector.extend(iter);
    vector
  }
}

impl<T, A: RawAllocator> Extend<T> for Vector<T, A> {
  fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
    self.try_extend(iter).unwrap_or_else(|err| err.handle())
  }
}

impl<'a, T, A: RawAllocator> IntoIterator for &'a Vector<T, A> {
  type Item = &'a T;
  type IntoIter = slice::Iter<'a, T>;

  fn into_iter(self) -> slice::Iter<'a, T> {
    self.as_slice().iter()
  }
}

impl<'a, T, A: RawAllocator> IntoIterator for &'a mut Vector<T, A> {
  type Item = &'a mut T;
  type IntoIter = slice::IterMut<'a, T>;

  fn into_iter(self) -> slice::IterMut<'a, T> {
    self.as_mut_slice().iter_mut()
  }
}

#[cfg(test)]
mod tests {
  use std::{cell::Cell, rc::Rc};

  use super::*;
  use crate::SizeClassAllocator;

  #[test]
  fn doubling_growth() {
    let mut v: Vector<u32> = Vector::new();
    assert_eq!(v.capacity(), 0);
    let mut caps = Vec::new();
    for i in 0..17 {
      v.push(i);
      caps.push(v.capacity());
    }
    assert_eq!(&caps[..6], &[1, 2, 4, 4, 8, 8]);
    assert_eq!(v.capacity(), 32);
    assert_eq!(v.len(), 17);
    assert_eq!(v[16], 16);
  }

  #[test]
  fn reserve_takes_the_larger_request() {
    let mut v: Vector<u8> = Vector::with_capacity(4);
    assert_eq!(v.capacity(), 4);
    v.reserve(100);
    assert_eq!(v.capacity(), 100);
    v.extend(0..3);
    v.shrink_to_fit();
    assert_eq!(v.capacity(), 3);
    assert_eq!(&v[..], &[0, 1, 2]);
  }

  #[test]
  fn insert_and_remove_shift() {
    let mut v: Vector<i32> = (0..5).collect();
    v.insert(0, -1);
    v.insert(3, 99);
    v.insert(v.len(), 100);
    assert_eq!(&v[..], &[-1, 0, 1, 99, 2, 3, 4, 100]);
    assert_eq!(v.remove(3), 99);
    assert_eq!(v.remove(0), -1);
    assert_eq!(v.pop(), Some(100));
    assert_eq!(&v[..], &[0, 1, 2, 3, 4]);
  }

  #[test]
  #[should_panic(expected = "removal index")]
  fn remove_out_of_bounds() {
    let mut v: Vector<i32> = (0..2).collect();
    v.remove(2);
  }

  #[test]
  fn truncate_drops_the_tail() {
    struct Tracked(Rc<Cell<usize>>);
    impl Drop for Tracked {
      fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
      }
    }

    let drops = Rc::new(Cell::new(0));
    let mut v = Vector::new();
    for _ in 0..10 {
      v.push(Tracked(drops.clone()));
    }
    v.truncate(4);
    assert_eq!(drops.get(), 6);
    assert_eq!(v.capacity(), 16);
    drop(v);
    assert_eq!(drops.get(), 10);
  }

  #[test]
  fn pooled_until_it_outgrows_the_classes() {
    let heap = SizeClassAllocator::new();
    let mut v: Vector<u64, _> = Vector::new_in(&heap);
    v.extend(0..16); // 128 bytes, still pooled
    assert_eq!(v.capacity(), 16);
    let pooled = heap.heap_size();
    assert!(pooled > 0);
    v.push(16); // 256 bytes, system allocator
    assert_eq!(heap.heap_size(), pooled);
    // The 128-byte block went back to its free list.
    assert!(heap.free_cells(128) >= 1);
    assert!(v.iter().copied().eq(0..17));
  }

  #[test]
  fn fallible_forms_leave_the_vector_alone() {
    let heap = SizeClassAllocator::with_heap_limit(0);
    let mut v: Vector<u16, _> = Vector::new_in(&heap);
    assert!(matches!(v.try_insert(0, 1), Err(AllocError::PoolExhausted { .. })));
    assert!(v.try_extend(0..4).is_err());
    assert!(v.is_empty());
    assert_eq!(v.capacity(), 0);
    assert!(v.try_shrink_to_fit().is_ok());

    let heap = SizeClassAllocator::new();
    let mut v: Vector<u16, _> = Vector::with_capacity_in(40, &heap);
    v.try_extend(0..5).unwrap();
    v.try_insert(2, 99).unwrap();
    v.try_shrink_to_fit().unwrap();
    assert_eq!(v.capacity(), 6);
    assert_eq!(&v[..], &[0, 1, 99, 2, 3, 4]);
  }

  #[test]
  fn raw_parts_hand_over_the_storage() {
    let heap = SizeClassAllocator::new();
    let mut v: Vector<u32, _> = Vector::new_in(&heap);
    v.extend(0..6);
    let (ptr, len, cap, alloc) = v.into_raw_parts_with_alloc();
    assert_eq!((len, cap), (6, 6));
    let mut v = unsafe { Vector::from_raw_parts_in(ptr, len, cap, alloc) };
    assert_eq!(v.as_ptr(), ptr.as_ptr() as *const u32);
    v.push(6);
    assert!(v.iter().copied().eq(0..7));
    unsafe { v.set_len(3) };
    assert_eq!(&v[..], &[0, 1, 2]);
  }

  #[test]
  fn clone_and_compare() {
    let a: Vector<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
    let b = a.clone();
    assert_eq!(a, b);
    assert_eq!(format!("{b:?}"), r#"["x", "y", "z"]"#);
    let mut c = b.clone();
    for s in &mut c {
      s.push('!');
    }
    assert_ne!(a, c);
  }
}
