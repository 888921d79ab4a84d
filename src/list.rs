//! Doubly linked list whose nodes come from a [`RawAllocator`].
//!
//! Each node is one allocation of `Node<T>`, so small elements are served
//! from the size classes. Splicing, merging and sorting relink nodes and never
//! move values.

use core::{cmp::Ordering, fmt, iter::FusedIterator, marker::PhantomData, mem, ptr::NonNull};

use crate::{
  alloc::{Global, RawAllocator},
  error::AllocError,
  typed::TypedAllocator,
};

type Link<T> = Option<NonNull<Node<T>>>;

struct Node<T> {
  prev: Link<T>,
  next: Link<T>,
  value: T,
}

/// Doubly linked list.
pub struct List<T, A: RawAllocator = Global> {
  head: Link<T>,
  tail: Link<T>,
  len: usize,
  alloc: A,
  _marker: PhantomData<T>,
}

impl<T> List<T> {
  pub fn new() -> Self {
    Self::new_in(Global)
  }
}

impl<T> Default for List<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T, A: RawAllocator> List<T, A> {
  /// Empty list. Allocates nothing.
  pub fn new_in(alloc: A) -> Self {
    Self { head: None, tail: None, len: 0, alloc, _marker: PhantomData }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.len
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn allocator(&self) -> &A {
    &self.alloc
  }

  // ===========================================================================
  // Nodes
  // ===========================================================================

  #[inline]
  fn nodes(&self) -> TypedAllocator<'_, Node<T>, A> {
    TypedAllocator::new(&self.alloc)
  }

  fn try_new_node(&self, value: T) -> Result<NonNull<Node<T>>, AllocError> {
    let node = self.nodes().allocate(1)?;
    unsafe { self.nodes().construct(node, Node { prev: None, next: None, value }) };
    Ok(node)
  }

  /// Moves the value out of an unlinked node and frees the node.
  unsafe fn free_node(&self, node: NonNull<Node<T>>) -> T {
    unsafe {
      let value = (&raw const (*node.as_ptr()).value).read();
      self.nodes().deallocate(node, 1);
      value
    }
  }

  /// Links the chain `first..=last` of `count` nodes between `prev` and
  /// `next`, which must be adjacent in this list (`None` for an edge).
  unsafe fn link_chain(
    &mut self,
    first: NonNull<Node<T>>,
    last: NonNull<Node<T>>,
    count: usize,
    prev: Link<T>,
    next: Link<T>,
  ) {
    unsafe {
      (*first.as_ptr()).prev = prev;
      (*last.as_ptr()).next = next;
      match prev {
        Some(prev) => (*prev.as_ptr()).next = Some(first),
        None => self.head = Some(first),
      }
      match next {
        Some(next) => (*next.as_ptr()).prev = Some(last),
        None => self.tail = Some(last),
      }
    }
    self.len += count;
  }

  unsafe fn unlink(&mut self, node: NonNull<Node<T>>) {
    unsafe {
      let Node { prev, next, .. } = *node.as_ptr();
      match prev {
        Some(prev) => (*prev.as_ptr()).next = next,
        None => self.head = next,
      }
      match next {
        Some(next) => (*next.as_ptr()).prev = prev,
        None => self.tail = prev,
      }
    }
    self.len -= 1;
  }

  /// Takes the whole chain out, leaving the list empty.
  fn detach_all(&mut self) -> Option<(NonNull<Node<T>>, NonNull<Node<T>>, usize)> {
    match (self.head.take(), self.tail.take()) {
      (Some(first), Some(last)) => Some((first, last, mem::take(&mut self.len))),
      _ => None,
    }
  }

  /// Rebuilds `prev`, `tail` and `len` from the `next` chain at `head`.
  unsafe fn relink(&mut self) {
    let mut prev = None;
    let mut at = self.head;
    let mut len = 0;
    while let Some(node) = at {
      unsafe {
        (*node.as_ptr()).prev = prev;
        at = (*node.as_ptr()).next;
      }
      prev = Some(node);
      len += 1;
    }
    self.tail = prev;
    self.len = len;
  }

  fn assert_interchangeable(&self, other: &A) {
    assert!(self.alloc.is_interchangeable(other), "lists draw nodes from different allocators");
  }

  // ===========================================================================
  // Edges
  // ===========================================================================

  pub fn front(&self) -> Option<&T> {
    self.head.map(|node| unsafe { &(*node.as_ptr()).value })
  }

  pub fn front_mut(&mut self) -> Option<&mut T> {
    self.head.map(|node| unsafe { &mut (*node.as_ptr()).value })
  }

  pub fn back(&self) -> Option<&T> {
    self.tail.map(|node| unsafe { &(*node.as_ptr()).value })
  }

  pub fn back_mut(&mut self) -> Option<&mut T> {
    self.tail.map(|node| unsafe { &mut (*node.as_ptr()).value })
  }

  pub fn push_back(&mut self, value: T) {
    self.try_push_back(value).unwrap_or_else(|err| err.handle())
  }

  pub fn try_push_back(&mut self, value: T) -> Result<(), AllocError> {
    let node = self.try_new_node(value)?;
    let tail = self.tail;
    unsafe { self.link_chain(node, node, 1, tail, None) };
    Ok(())
  }

  pub fn push_front(&mut self, value: T) {
    self.try_push_front(value).unwrap_or_else(|err| err.handle())
  }

  pub fn try_push_front(&mut self, value: T) -> Result<(), AllocError> {
    let node = self.try_new_node(value)?;
    let head = self.head;
    unsafe { self.link_chain(node, node, 1, None, head) };
    Ok(())
  }

  pub fn pop_front(&mut self) -> Option<T> {
    let node = self.head?;
    unsafe {
      self.unlink(node);
      Some(self.free_node(node))
    }
  }

  pub fn pop_back(&mut self) -> Option<T> {
    let node = self.tail?;
    unsafe {
      self.unlink(node);
      Some(self.free_node(node))
    }
  }

  pub fn clear(&mut self) {
    while self.pop_front().is_some() {}
  }

  pub fn contains(&self, value: &T) -> bool
  where
    T: PartialEq,
  {
    self.iter().any(|item| item == value)
  }

  pub fn iter(&self) -> Iter<'_, T> {
    Iter { head: self.head, tail: self.tail, len: self.len, _marker: PhantomData }
  }

  pub fn iter_mut(&mut self) -> IterMut<'_, T> {
    IterMut { head: self.head, tail: self.tail, len: self.len, _marker: PhantomData }
  }

  /// Cursor on the first element, or on the ghost position when empty.
  pub fn cursor_front_mut(&mut self) -> CursorMut<'_, T, A> {
    CursorMut { current: self.head, index: 0, list: self }
  }

  /// Cursor on the last element, or on the ghost position when empty.
  pub fn cursor_back_mut(&mut self) -> CursorMut<'_, T, A> {
    let index = self.len.saturating_sub(1);
    CursorMut { current: self.tail, index, list: self }
  }

  // ===========================================================================
  // Whole-list operations
  // ===========================================================================

  /// Moves every node of `other` to the back of `self`. O(1).
  ///
  /// # Panics
  ///
  /// If the two lists' allocators are not interchangeable.
  pub fn append(&mut self, other: &mut Self) {
    self.assert_interchangeable(&other.alloc);
    if let Some((first, last, count)) = other.detach_all() {
      let tail = self.tail;
      unsafe { self.link_chain(first, last, count, tail, None) };
    }
  }

  /// Removes every element equal to `value`. Returns how many went.
  pub fn remove(&mut self, value: &T) -> usize
  where
    T: PartialEq,
  {
    let before = self.len;
    self.retain(|item| item != value);
    before - self.len
  }

  /// Keeps only the elements `keep` accepts, in order.
  pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
    let mut at = self.head;
    while let Some(node) = at {
      unsafe {
        at = (*node.as_ptr()).next;
        if !keep(&(*node.as_ptr()).value) {
          self.unlink(node);
          drop(self.free_node(node));
        }
      }
    }
  }

  /// Collapses each run of consecutive equal elements to its first element.
  pub fn dedup(&mut self)
  where
    T: PartialEq,
  {
    self.dedup_by(|a, b| a == b)
  }

  /// Like [`List::dedup`] with a custom equality. `same(next, kept)`.
  pub fn dedup_by(&mut self, mut same: impl FnMut(&T, &T) -> bool) {
    let Some(mut kept) = self.head else { return };
    while let Some(next) = unsafe { (*kept.as_ptr()).next } {
      if unsafe { same(&(*next.as_ptr()).value, &(*kept.as_ptr()).value) } {
        unsafe {
          self.unlink(next);
          drop(self.free_node(next));
        }
      } else {
        kept = next;
      }
    }
  }

  pub fn reverse(&mut self) {
    let mut at = self.head;
    while let Some(node) = at {
      unsafe {
        let node = &mut *node.as_ptr();
        mem::swap(&mut node.prev, &mut node.next);
        at = node.prev;
      }
    }
    mem::swap(&mut self.head, &mut self.tail);
  }

  pub fn sort(&mut self)
  where
    T: Ord,
  {
    self.sort_by(T::cmp)
  }

  /// Stable merge sort that relinks nodes. O(n log n) comparisons, no
  /// allocation.
  ///
  /// If `compare` panics the list stays valid but keeps only part of its
  /// elements; the nodes cut off are leaked.
  pub fn sort_by(&mut self, mut compare: impl FnMut(&T, &T) -> Ordering) {
    let Some(head) = self.head else { return };
    let len = self.len;
    if len < 2 {
      return;
    }
    let guard = Relink { list: self };
    let sorted = unsafe { merge_sort(head, len, &mut compare) };
    guard.list.head = Some(sorted);
  }

  /// Merges the sorted `other` into the sorted `self`, leaving `other` empty.
  /// On ties the element of `self` comes first.
  ///
  /// # Panics
  ///
  /// If the two lists' allocators are not interchangeable.
  pub fn merge(&mut self, other: &mut Self)
  where
    T: Ord,
  {
    self.merge_by(other, T::cmp)
  }

  pub fn merge_by(&mut self, other: &mut Self, mut compare: impl FnMut(&T, &T) -> Ordering) {
    self.assert_interchangeable(&other.alloc);
    let Some((first, _, _)) = other.detach_all() else { return };
    let head = self.head;
    let guard = Relink { list: self };
    let merged = unsafe { merge_chains(head, Some(first), &mut compare) };
    guard.list.head = merged;
  }
}

/// Restores the back links of a list whose `next` chain was rewritten, also
/// when a comparator panicked halfway.
struct Relink<'a, T, A: RawAllocator> {
  list: &'a mut List<T, A>,
}

impl<T, A: RawAllocator> Drop for Relink<'_, T, A> {
  fn drop(&mut self) {
    unsafe { self.list.relink() };
  }
}

/// Sorts the `len` nodes reachable through `next` from `first` and returns
/// the new first node. Only `next` links are maintained.
unsafe fn merge_sort<T>(
  first: NonNull<Node<T>>,
  len: usize,
  compare: &mut impl FnMut(&T, &T) -> Ordering,
) -> NonNull<Node<T>> {
  if len == 1 {
    unsafe { (*first.as_ptr()).next = None };
    return first;
  }
  let half = len / 2;
  let mut second = first;
  for _ in 0..half {
    second = unsafe { (*second.as_ptr()).next.unwrap_unchecked() };
  }
  unsafe {
    let left = merge_sort(first, half, compare);
    let right = merge_sort(second, len - half, compare);
    // Both halves are non-empty, so the merge is too.
    merge_chains(Some(left), Some(right), compare).unwrap_unchecked()
  }
}

/// Merges two `next` chains ending in `None`. Ties take from `a`.
unsafe fn merge_chains<T>(
  mut a: Link<T>,
  mut b: Link<T>,
  compare: &mut impl FnMut(&T, &T) -> Ordering,
) -> Link<T> {
  let mut head: Link<T> = None;
  let mut tail: Link<T> = None;
  loop {
    let picked = match (a, b) {
      (Some(x), Some(y)) => unsafe {
        if compare(&(*y.as_ptr()).value, &(*x.as_ptr()).value) == Ordering::Less {
          b = (*y.as_ptr()).next;
          y
        } else {
          a = (*x.as_ptr()).next;
          x
        }
      },
      (rest, None) | (None, rest) => {
        match tail {
          Some(tail) => unsafe { (*tail.as_ptr()).next = rest },
          None => head = rest,
        }
        return head;
      }
    };
    match tail {
      Some(tail) => unsafe { (*tail.as_ptr()).next = Some(picked) },
      None => head = Some(picked),
    }
    tail = Some(picked);
  }
}

impl<T, A: RawAllocator> Drop for List<T, A> {
  fn drop(&mut self) {
    struct DropGuard<'a, T, A: RawAllocator>(&'a mut List<T, A>);

    impl<T, A: RawAllocator> Drop for DropGuard<'_, T, A> {
      fn drop(&mut self) {
        // A destructor panicked; free the rest anyway.
        while self.0.pop_front().is_some() {}
      }
    }

    let guard = DropGuard(self);
    while guard.0.pop_front().is_some() {}
    mem::forget(guard);
  }
}

// =============================================================================
// Cursor
// =============================================================================

/// Mutable position in a [`List`].
///
/// Besides the elements there is one ghost position between the back and the
/// front; moving past either end lands on it, and moving again wraps around.
pub struct CursorMut<'a, T, A: RawAllocator = Global> {
  list: &'a mut List<T, A>,
  current: Link<T>,
  // Equals `list.len` on the ghost position.
  index: usize,
}

impl<T, A: RawAllocator> CursorMut<'_, T, A> {
  /// Index of the current element, `None` on the ghost position.
  pub fn index(&self) -> Option<usize> {
    self.current.map(|_| self.index)
  }

  pub fn current(&mut self) -> Option<&mut T> {
    self.current.map(|node| unsafe { &mut (*node.as_ptr()).value })
  }

  fn next_link(&self) -> Link<T> {
    match self.current {
      Some(node) => unsafe { (*node.as_ptr()).next },
      None => self.list.head,
    }
  }

  fn prev_link(&self) -> Link<T> {
    match self.current {
      Some(node) => unsafe { (*node.as_ptr()).prev },
      None => self.list.tail,
    }
  }

  pub fn peek_next(&mut self) -> Option<&mut T> {
    self.next_link().map(|node| unsafe { &mut (*node.as_ptr()).value })
  }

  pub fn peek_prev(&mut self) -> Option<&mut T> {
    self.prev_link().map(|node| unsafe { &mut (*node.as_ptr()).value })
  }

  pub fn move_next(&mut self) {
    let next = self.next_link();
    self.index = match self.current {
      Some(_) => self.index + 1,
      None => 0,
    };
    self.current = next;
  }

  pub fn move_prev(&mut self) {
    let prev = self.prev_link();
    self.index = match (self.current, prev) {
      (Some(_), Some(_)) => self.index - 1,
      (Some(_), None) => self.list.len,
      (None, _) => self.list.len.saturating_sub(1),
    };
    self.current = prev;
  }

  /// Inserts `value` before the current element; on the ghost position that
  /// is the back of the list.
  pub fn insert_before(&mut self, value: T) {
    self.try_insert_before(value).unwrap_or_else(|err| err.handle())
  }

  pub fn try_insert_before(&mut self, value: T) -> Result<(), AllocError> {
    let node = self.list.try_new_node(value)?;
    let (prev, next) = (self.prev_link(), self.current);
    unsafe { self.list.link_chain(node, node, 1, prev, next) };
    self.index += 1;
    Ok(())
  }

  /// Inserts `value` after the current element; on the ghost position that
  /// is the front of the list.
  pub fn insert_after(&mut self, value: T) {
    self.try_insert_after(value).unwrap_or_else(|err| err.handle())
  }

  pub fn try_insert_after(&mut self, value: T) -> Result<(), AllocError> {
    let node = self.list.try_new_node(value)?;
    let (prev, next) = (self.current, self.next_link());
    unsafe { self.list.link_chain(node, node, 1, prev, next) };
    if self.current.is_none() {
      self.index += 1;
    }
    Ok(())
  }

  /// Removes the current element and moves on to the next one.
  pub fn remove_current(&mut self) -> Option<T> {
    let node = self.current?;
    unsafe {
      self.current = (*node.as_ptr()).next;
      self.list.unlink(node);
      Some(self.list.free_node(node))
    }
  }

  /// Unlinks the current element into a list of its own, without copying
  /// it, and moves on to the next one.
  pub fn remove_current_as_list(&mut self) -> Option<List<T, A>>
  where
    A: Clone,
  {
    let node = self.current?;
    let mut single = List::new_in(self.list.alloc.clone());
    single.assert_interchangeable(&self.list.alloc);
    unsafe {
      self.current = (*node.as_ptr()).next;
      self.list.unlink(node);
      single.link_chain(node, node, 1, None, None);
    }
    Some(single)
  }

  /// Moves every node of `other` in before the current element.
  ///
  /// # Panics
  ///
  /// If the two lists' allocators are not interchangeable.
  pub fn splice_before(&mut self, mut other: List<T, A>) {
    self.list.assert_interchangeable(&other.alloc);
    let Some((first, last, count)) = other.detach_all() else { return };
    let (prev, next) = (self.prev_link(), self.current);
    unsafe { self.list.link_chain(first, last, count, prev, next) };
    self.index += count;
  }

  /// Moves every node of `other` in after the current element.
  ///
  /// # Panics
  ///
  /// If the two lists' allocators are not interchangeable.
  pub fn splice_after(&mut self, mut other: List<T, A>) {
    self.list.assert_interchangeable(&other.alloc);
    let Some((first, last, count)) = other.detach_all() else { return };
    let (prev, next) = (self.current, self.next_link());
    unsafe { self.list.link_chain(first, last, count, prev, next) };
    if self.current.is_none() {
      self.index += count;
    }
  }

  /// Cuts off everything after the current element into a new list. On the
  /// ghost position that is the whole list.
  pub fn split_after(&mut self) -> List<T, A>
  where
    A: Clone,
  {
    let mut rest = List::new_in(self.list.alloc.clone());
    rest.assert_interchangeable(&self.list.alloc);
    let keep = match self.current {
      Some(_) => self.index + 1,
      None => 0,
    };
    if let (Some(first), Some(last)) = (self.next_link(), self.list.tail) {
      unsafe {
        let cut = (*first.as_ptr()).prev;
        match cut {
          Some(cut) => (*cut.as_ptr()).next = None,
          None => self.list.head = None,
        }
        self.list.tail = cut;
        let count = self.list.len - keep;
        self.list.len = keep;
        rest.link_chain(first, last, count, None, None);
      }
    }
    if self.current.is_none() {
      self.index = self.list.len;
    }
    rest
  }
}

// =============================================================================
// Iterators
// =============================================================================

/// Borrowing iterator over a [`List`].
pub struct Iter<'a, T> {
  head: Link<T>,
  tail: Link<T>,
  len: usize,
  _marker: PhantomData<&'a Node<T>>,
}

/// Mutable borrowing iterator over a [`List`].
pub struct IterMut<'a, T> {
  head: Link<T>,
  tail: Link<T>,
  len: usize,
  _marker: PhantomData<&'a mut Node<T>>,
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
    if self.len == 0 {
      return None;
    }
    self.head.map(|node| unsafe {
      let node = &*node.as_ptr();
      self.len -= 1;
      self.head = node.next;
      &node.value
    })
  }

  #[inline]
  fn size_hint(&self) -> (usize, Option<usize>) {
    (self.len, Some(self.len))
  }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
  #[inline]
  fn next_back(&mut self) -> Option<Self::Item> {
    if self.len == 0 {
      return None;
    }
    self.tail.map(|node| unsafe {
      let node = &*node.as_ptr();
      self.len -= 1;
      self.tail = node.prev;
      &node.value
    })
  }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
impl<T> FusedIterator for Iter<'_, T> {}

impl<'a, T> Iterator for IterMut<'a, T> {
  type Item = &'a mut T;

  #[inline]
  fn next(&mut self) -> Option<&'a mut T> {
    if self.len == 0 {
      return None;
    }
    self.head.map(|node| unsafe {
      let node = &mut *node.as_ptr();
      self.len -= 1;
      self.head = node.next;
      &mut node.value
    })
  }

  #[inline]
  fn size_hint(&self) -> (usize, Option<usize>) {
    (self.len, Some(self.len))
  }
}

impl<T> DoubleEndedIterator for IterMut<'_, T> {
  #[inline]
  fn next_back(&mut self) -> Option<Self::Item> {
    if self.len == 0 {
      return None;
    }
    self.tail.map(|node| unsafe {
      let node = &mut *node.as_ptr();
      self.len -= 1;
      self.tail = node.prev;
      &mut node.value
    })
  }
}

impl<T> ExactSizeIterator for IterMut<'_, T> {}
impl<T> FusedIterator for IterMut<'_, T> {}

/// Owning iterator over a [`List`].
pub struct IntoIter<T, A: RawAllocator> {
  list: List<T, A>,
}

impl<T: fmt::Debug, A: RawAllocator> fmt::Debug for IntoIter<T, A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("IntoIter").field(&self.list).finish()
  }
}

impl<T, A: RawAllocator> Iterator for IntoIter<T, A> {
  type Item = T;

  #[inline]
  fn next(&mut self) -> Option<T> {
    self.list.pop_front()
  }

  #[inline]
  fn size_hint(&self) -> (usize, Option<usize>) {
    (self.list.len, Some(self.list.len))
  }
}

impl<T, A: RawAllocator> DoubleEndedIterator for IntoIter<T, A> {
  #[inline]
  fn next_back(&mut self) -> Option<T> {
    self.list.pop_back()
  }
}

impl<T, A: RawAllocator> ExactSizeIterator for IntoIter<T, A> {}
impl<T, A: RawAllocator> FusedIterator for IntoIter<T, A> {}

impl<T, A: RawAllocator> IntoIterator for List<T, A> {
  type Item = T;
  type IntoIter = IntoIter<T, A>;

  fn into_iter(self) -> IntoIter<T, A> {
    IntoIter { list: self }
  }
}

impl<'a, T, A: RawAllocator> IntoIterator for &'a List<T, A> {
  type Item = &'a T;
  type IntoIter = Iter<'a, T>;

  fn into_iter(self) -> Iter<'a, T> {
    self.iter()
  }
}

impl<'a, T, A: RawAllocator> IntoIterator for &'a mut List<T, A> {
  type Item = &'a mut T;
  type IntoIter = IterMut<'a, T>;

  fn into_iter(self) -> IterMut<'a, T> {
    self.iter_mut()
  }
}

// =============================================================================
// Trait impls
// =============================================================================

impl<T: Clone, A: RawAllocator + Clone> Clone for List<T, A> {
  fn clone(&self) -> Self {
    let mut out = Self::new_in(self.alloc.clone());
    out.extend(self.iter().cloned());
    out
  }
}

impl<T: fmt::Debug, A: RawAllocator> fmt::Debug for List<T, A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(self.iter()).finish()
  }
}

impl<T: PartialEq, A: RawAllocator, B: RawAllocator> PartialEq<List<T, B>> for List<T, A> {
  fn eq(&self, other: &List<T, B>) -> bool {
    self.len == other.len && self.iter().eq(other.iter())
  }
}

impl<T: Eq, A: RawAllocator> Eq for List<T, A> {}

impl<T> FromIterator<T> for List<T> {
  fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
    let mut list = List::new();
    list.extend(iter);
    list
  }
}

impl<T, A: RawAllocator> Extend<T> for List<T, A> {
  fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
    for value in iter {
      self.push_back(value);
    }
  }
}
