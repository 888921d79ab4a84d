use core::{fmt, iter::FusedIterator, marker::PhantomData, ptr::NonNull};

use super::{Cursor, Deque};
use crate::alloc::RawAllocator;

/// Borrowing iterator over a [`Deque`], front to back.
pub struct Iter<'a, T> {
  map: NonNull<NonNull<T>>,
  head: Cursor,
  tail: Cursor,
  _marker: PhantomData<&'a T>,
}

/// Mutable borrowing iterator over a [`Deque`], front to back.
pub struct IterMut<'a, T> {
  map: NonNull<NonNull<T>>,
  head: Cursor,
  tail: Cursor,
  _marker: PhantomData<&'a mut T>,
}

#[inline]
unsafe fn slot<T>(map: NonNull<NonNull<T>>, at: Cursor) -> *mut T {
  unsafe { map.add(at.node).read().as_ptr().add(at.offset) }
}

impl<T> Iter<'_, T> {
  pub(super) fn new(map: NonNull<NonNull<T>>, head: Cursor, tail: Cursor) -> Self {
    Self { map, head, tail, _marker: PhantomData }
  }
}

impl<T> IterMut<'_, T> {
  pub(super) fn new(map: NonNull<NonNull<T>>, head: Cursor, tail: Cursor) -> Self {
    Self { map, head, tail, _marker: PhantomData }
  }
}

impl<T> Clone for Iter<'_, T> {
  fn clone(&self) -> Self {
    Self { ..*self }
  }
}

impl<T: fmt::Debug> fmt::Debug for Iter<'_, T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(self.clone()).finish()
  }
}

impl<'a, T> Iterator for Iter<'a, T> {
  type Item = &'a T;

  #[inline]
  fn next(&mut self) -> Option<&'a T> {
    if self.head == self.tail {
      return None;
    }
    let value = unsafe { &*slot(self.map, self.head) };
    self.head.inc();
    Some(value)
  }

  #[inline]
  fn size_hint(&self) -> (usize, Option<usize>) {
    let len = (self.tail - self.head) as usize;
    (len, Some(len))
  }

  fn nth(&mut self, n: usize) -> Option<&'a T> {
    if n >= self.len() {
      self.head = self.tail;
      return None;
    }
    self.head += n as isize;
    self.next()
  }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
  #[inline]
  fn next_back(&mut self) -> Option<Self::Item> {
    if self.head == self.tail {
      return None;
    }
    self.tail.dec();
    Some(unsafe { &*slot(self.map, self.tail) })
  }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

impl<'a, T> Iterator for IterMut<'a, T> {
  type Item = &'a mut T;

  #[inline]
  fn next(&mut self) -> Option<&'a mut T> {
    if self.head == self.tail {
      return None;
    }
    // Each slot is yielded once, so the borrows never alias.
    let value = unsafe { &mut *slot(self.map, self.head) };
    self.head.inc();
    Some(value)
  }

  #[inline]
  fn size_hint(&self) -> (usize, Option<usize>) {
    let len = (self.tail - self.head) as usize;
    (len, Some(len))
  }
}

impl<T> DoubleEndedIterator for IterMut<'_, T> {
  #[inline]
  fn next_back(&mut self) -> Option<Self::Item> {
    if self.head == self.tail {
      return None;
    }
    self.tail.dec();
    Some(unsafe { &mut *slot(self.map, self.tail) })
  }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}
impl<T> FusedIterator for IterMut<'_, T> {}

/// Owning iterator over a [`Deque`]. Buffers are released as they empty.
pub struct IntoIter<T, A: RawAllocator> {
  deque: Deque<T, A>,
}

impl<T: fmt::Debug, A: RawAllocator> fmt::Debug for IntoIter<T, A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("IntoIter").field(&self.deque).finish()
  }
}

impl<T, A: RawAllocator> Iterator for IntoIter<T, A> {
  type Item = T;

  #[inline]
  fn next(&mut self) -> Option<T> {
    self.deque.pop_front()
  }

  #[inline]
  fn size_hint(&self) -> (usize, Option<usize>) {
    let len = self.deque.len();
    (len, Some(len))
  }
}

impl<T, A: RawAllocator> DoubleEndedIterator for IntoIter<T, A> {
  #[inline]
  fn next_back(&mut self) -> Option<T> {
    self.deque.pop_back()
  }
}

impl<T, A: RawAllocator> ExactSizeIterator for IntoIter<T, A> {}
impl<T, A: RawAllocator> FusedIterator for IntoIter<T, A> {}

impl<T, A: RawAllocator> IntoIterator for Deque<T, A> {
  type Item = T;
  type IntoIter = IntoIter<T, A>;

  fn into_iter(self) -> IntoIter<T, A> {
    IntoIter { deque: self }
  }
}

impl<'a, T, A: RawAllocator> IntoIterator for &'a Deque<T, A> {
  type Item = &'a T;
  type IntoIter = Iter<'a, T>;

  fn into_iter(self) -> Iter<'a, T> {
    self.iter()
  }
}

impl<'a, T, A: RawAllocator> IntoIterator for &'a mut Deque<T, A> {
  type Item = &'a mut T;
  type IntoIter = IterMut<'a, T>;

  fn into_iter(self) -> IterMut<'a, T> {
    self.iter_mut()
  }
}

#[cfg(test)]
mod tests {
  use crate::Deque;

  #[test]
  fn both_ends_meet() {
    let deque: Deque<i32> = (0..21).collect();
    let mut iter = deque.iter();
    assert_eq!(iter.len(), 21);
    assert_eq!(iter.next(), Some(&0));
    assert_eq!(iter.next_back(), Some(&20));
    assert_eq!(iter.len(), 19);
    let middle: Vec<i32> = iter.by_ref().copied().collect();
    assert_eq!(middle, (1..20).collect::<Vec<_>>());
    assert_eq!(iter.next(), None);
    assert_eq!(iter.next_back(), None);
  }

  #[test]
  fn nth_skips_whole_buffers() {
    let deque: Deque<i32> = (0..40).collect();
    let mut iter = deque.iter();
    assert_eq!(iter.nth(17), Some(&17));
    assert_eq!(iter.nth(0), Some(&18));
    assert_eq!(iter.nth(100), None);
    assert_eq!(iter.next(), None);
  }

  #[test]
  fn reverse_after_front_pushes() {
    let mut deque = Deque::new();
    for i in 0..19 {
      deque.push_front(i);
    }
    let back_to_front: Vec<i32> = deque.iter().rev().copied().collect();
    assert_eq!(back_to_front, (0..19).collect::<Vec<_>>());
  }

  #[test]
  fn iter_mut_writes_through() {
    let mut deque: Deque<i32> = (0..30).collect();
    for value in &mut deque {
      *value *= 2;
    }
    if let Some(last) = deque.iter_mut().next_back() {
      *last = -1;
    }
    assert_eq!(deque[29], -1);
    assert!((&deque).into_iter().take(29).enumerate().all(|(i, &v)| v == 2 * i as i32));
  }

  #[test]
  fn into_iter_from_both_ends() {
    let deque: Deque<String> = (0..20).map(|i| i.to_string()).collect();
    let mut iter = deque.into_iter();
    assert_eq!(iter.next().as_deref(), Some("0"));
    assert_eq!(iter.next_back().as_deref(), Some("19"));
    assert_eq!(iter.len(), 18);
    // The rest is dropped with the iterator.
  }
}
