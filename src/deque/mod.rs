//! Double-ended queue over fixed-size buffers.
//!
//! ```text
//!   map (control array)      buffers (BUFFER_SIZE slots each)
//!   ┌───┐
//!   │   │ slack
//!   ├───┤      ┌───┬───┬───┬───┬───┬───┬───┬───┐
//!   │ ● │────▶ │   │   │   │ a │ b │ c │ d │ e │   start = (1, 3)
//!   ├───┤      ├───┼───┼───┼───┼───┼───┼───┼───┤
//!   │ ● │────▶ │ f │ g │ h │ i │ j │ k │ l │ m │
//!   ├───┤      ├───┼───┼───┼───┼───┼───┼───┼───┤
//!   │ ● │────▶ │ n │ o │   │   │   │   │   │   │   finish = (3, 2)
//!   ├───┤      └───┴───┴───┴───┴───┴───┴───┴───┘
//!   │   │ slack
//!   └───┘
//! ```
//!
//! Every slot in `[start.node, finish.node]` points to an allocated buffer.
//! Live elements are exactly `[start, finish)`. The finish buffer is always
//! allocated, even when `finish.offset == 0`.

use core::{
  fmt,
  iter::repeat_n,
  marker::PhantomData,
  mem,
  ops::{Index, IndexMut},
  ptr::{self, NonNull},
};

use tracing::trace;

use crate::{
  alloc::{Global, RawAllocator},
  error::AllocError,
  typed::TypedAllocator,
  vector::Vector,
};

mod cursor;
mod iter;

pub use cursor::Cursor;
pub use iter::{IntoIter, Iter, IterMut};

/// Elements per buffer.
pub const BUFFER_SIZE: usize = 8;

const _: () = assert!(BUFFER_SIZE >= 2);

/// Segmented double-ended queue.
///
/// Pushing and popping at either end is amortized O(1) and never moves
/// existing elements. Inserting or erasing in the middle shifts whichever side
/// of the position holds fewer elements.
pub struct Deque<T, A: RawAllocator = Global> {
  start: Cursor,
  finish: Cursor,
  map: NonNull<NonNull<T>>,
  map_size: usize,
  alloc: A,
  _marker: PhantomData<T>,
}

impl<T> Deque<T> {
  /// Empty deque on the thread's [`Global`] allocator. Allocates one buffer.
  pub fn new() -> Self {
    Self::new_in(Global)
  }

  /// `n` clones of `value`.
  pub fn from_elem(n: usize, value: T) -> Self
  where
    T: Clone,
  {
    Self::from_elem_in(n, value, Global)
  }
}

impl<T> Default for Deque<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T, A: RawAllocator> Deque<T, A> {
  pub fn new_in(alloc: A) -> Self {
    Self::try_new_in(alloc).unwrap_or_else(|err| err.handle())
  }

  pub fn try_new_in(alloc: A) -> Result<Self, AllocError> {
    Self::create_backing_storage(0, alloc)
  }

  pub fn from_elem_in(n: usize, value: T, alloc: A) -> Self
  where
    T: Clone,
  {
    Self::try_from_elem_in(n, value, alloc).unwrap_or_else(|err| err.handle())
  }

  pub fn try_from_elem_in(n: usize, value: T, alloc: A) -> Result<Self, AllocError>
  where
    T: Clone,
  {
    Self::try_from_iter_in(repeat_n(value, n), alloc)
  }

  /// Builds a deque from `iter`. When the iterator reports an exact length the
  /// buffers are allocated up front; elements are still constructed one at a
  /// time.
  pub fn try_from_iter_in<I: IntoIterator<Item = T>>(iter: I, alloc: A) -> Result<Self, AllocError> {
    let mut iter = iter.into_iter();
    let expected = match iter.size_hint() {
      (lower, Some(upper)) if lower == upper => lower,
      _ => 0,
    };

    let mut deque = Self::create_backing_storage(expected, alloc)?;
    let last_node = deque.start.node + expected / BUFFER_SIZE;
    for _ in 0..expected {
      let Some(value) = iter.next() else { break };
      unsafe { deque.slot(deque.finish).write(value) };
      deque.finish.inc();
    }
    // The iterator came up short: give back the buffers it never reached.
    for node in deque.finish.node + 1..=last_node {
      unsafe { deque.deallocate_buffer(node) };
    }
    for value in iter {
      deque.try_push_back(value)?;
    }
    Ok(deque)
  }

  // ===========================================================================
  // Storage
  // ===========================================================================

  #[inline]
  fn buffers(&self) -> TypedAllocator<'_, T, A> {
    TypedAllocator::new(&self.alloc)
  }

  #[inline]
  fn maps(&self) -> TypedAllocator<'_, NonNull<T>, A> {
    TypedAllocator::new(&self.alloc)
  }

  /// Buffer referenced by control-array slot `node`.
  #[inline]
  unsafe fn buffer(&self, node: usize) -> *mut T {
    debug_assert!(node < self.map_size);
    unsafe { self.map.add(node).read().as_ptr() }
  }

  #[inline]
  unsafe fn set_buffer(&mut self, node: usize, buffer: NonNull<T>) {
    debug_assert!(node < self.map_size);
    unsafe { self.map.add(node).write(buffer) };
  }

  /// Address of the slot `at` refers to.
  #[inline]
  unsafe fn slot(&self, at: Cursor) -> *mut T {
    unsafe { self.buffer(at.node).add(at.offset) }
  }

  #[inline]
  fn allocate_buffer(&self) -> Result<NonNull<T>, AllocError> {
    self.buffers().allocate(BUFFER_SIZE)
  }

  #[inline]
  unsafe fn deallocate_buffer(&self, node: usize) {
    debug_assert!(node < self.map_size);
    unsafe { self.buffers().deallocate(self.map.add(node).read(), BUFFER_SIZE) };
  }

  /// Allocates a control array and `count / BUFFER_SIZE + 1` buffers centred
  /// in it, with one spare slot at each end. The deque starts empty at the
  /// origin of the first buffer; the buffers after the first are owned by
  /// the caller until `finish` reaches them.
  fn create_backing_storage(count: usize, alloc: A) -> Result<Self, AllocError> {
    const { assert!(size_of::<T>() != 0, "zero-sized elements are not supported") };

    let nodes = count / BUFFER_SIZE + 1;
    let map_size = nodes.checked_add(2).ok_or(AllocError::CapacityOverflow)?;
    let map = TypedAllocator::<NonNull<T>, A>::new(&alloc).allocate(map_size)?;
    let first = (map_size - nodes) / 2;

    let buffers = TypedAllocator::<T, A>::new(&alloc);
    for i in 0..nodes {
      match buffers.allocate(BUFFER_SIZE) {
        Ok(buffer) => unsafe { map.add(first + i).write(buffer) },
        Err(err) => {
          unsafe {
            for j in 0..i {
              buffers.deallocate(map.add(first + j).read(), BUFFER_SIZE);
            }
            TypedAllocator::<NonNull<T>, A>::new(&alloc).deallocate(map, map_size);
          }
          return Err(err);
        }
      }
    }

    let origin = Cursor::new(first, 0);
    Ok(Self {
      start: origin,
      finish: origin,
      map,
      map_size,
      alloc,
      _marker: PhantomData,
    })
  }

  /// Makes room in the control array for `nodes` more buffers after the
  /// finish slot.
  #[inline]
  fn reserve_map_at_back(&mut self, nodes: usize) -> Result<(), AllocError> {
    if self.finish.node + nodes >= self.map_size {
      self.grow_control_array(nodes, false)?;
    }
    Ok(())
  }

  /// Makes room in the control array for `nodes` more buffers before the
  /// start slot.
  #[inline]
  fn reserve_map_at_front(&mut self, nodes: usize) -> Result<(), AllocError> {
    if nodes > self.start.node {
      self.grow_control_array(nodes, true)?;
    }
    Ok(())
  }

  /// Recentres the used slots when the control array is at least twice the
  /// new node count, otherwise moves them to a new array of
  /// `2 * new_nodes + 2` slots. Either way `nodes_to_add` free slots end up
  /// on the growing side and both edge cursors are rebound by slot index.
  #[inline(never)]
  fn grow_control_array(&mut self, nodes_to_add: usize, at_front: bool) -> Result<(), AllocError> {
    let old_nodes = self.finish.node - self.start.node + 1;
    let new_nodes = old_nodes + nodes_to_add;
    let shift = if at_front { nodes_to_add } else { 0 };

    let new_start = if self.map_size >= 2 * new_nodes {
      let new_start = (self.map_size - new_nodes) / 2 + shift;
      // Overlapping move in either direction.
      unsafe {
        ptr::copy(
          self.map.as_ptr().add(self.start.node),
          self.map.as_ptr().add(new_start),
          old_nodes,
        );
      }
      trace!(map_size = self.map_size, from = self.start.node, to = new_start, "recentred control array");
      new_start
    } else {
      let new_size = new_nodes
        .checked_mul(2)
        .and_then(|n| n.checked_add(2))
        .ok_or(AllocError::CapacityOverflow)?;
      let new_map = self.maps().allocate(new_size)?;
      let new_start = (new_size - new_nodes) / 2 + shift;
      unsafe {
        ptr::copy_nonoverlapping(
          self.map.as_ptr().add(self.start.node),
          new_map.as_ptr().add(new_start),
          old_nodes,
        );
        self.maps().deallocate(self.map, self.map_size);
      }
      trace!(old_size = self.map_size, new_size, "reallocated control array");
      self.map = new_map;
      self.map_size = new_size;
      new_start
    };

    self.start.node = new_start;
    self.finish.node = new_start + old_nodes - 1;
    Ok(())
  }

  /// Allocates the buffers needed for `n` more elements before `start` and
  /// returns what `start` becomes once they are filled. All-or-nothing.
  fn reserve_elements_at_front(&mut self, n: usize) -> Result<Cursor, AllocError> {
    let vacancies = self.start.offset;
    if n > vacancies {
      let nodes = (n - vacancies).div_ceil(BUFFER_SIZE);
      self.reserve_map_at_front(nodes)?;
      for i in 1..=nodes {
        match self.allocate_buffer() {
          Ok(buffer) => unsafe { self.set_buffer(self.start.node - i, buffer) },
          Err(err) => {
            for j in 1..i {
              unsafe { self.deallocate_buffer(self.start.node - j) };
            }
            return Err(err);
          }
        }
      }
    }
    Ok(self.start - n as isize)
  }

  /// Allocates the buffers needed for `n` more elements at `finish` and
  /// returns what `finish` becomes once they are filled. All-or-nothing.
  fn reserve_elements_at_back(&mut self, n: usize) -> Result<Cursor, AllocError> {
    let vacancies = BUFFER_SIZE - 1 - self.finish.offset;
    if n > vacancies {
      let nodes = (n - vacancies).div_ceil(BUFFER_SIZE);
      self.reserve_map_at_back(nodes)?;
      for i in 1..=nodes {
        match self.allocate_buffer() {
          Ok(buffer) => unsafe { self.set_buffer(self.finish.node + i, buffer) },
          Err(err) => {
            for j in 1..i {
              unsafe { self.deallocate_buffer(self.finish.node + j) };
            }
            return Err(err);
          }
        }
      }
    }
    Ok(self.finish + n as isize)
  }

  /// Moves `count` elements from `src` to `dst`, front to back, one buffer
  /// segment at a time. Safe for overlap when `dst` is before `src`.
  unsafe fn move_forward(&self, mut src: Cursor, mut dst: Cursor, mut count: usize) {
    while count > 0 {
      let chunk = count.min(BUFFER_SIZE - src.offset).min(BUFFER_SIZE - dst.offset);
      unsafe { ptr::copy(self.slot(src), self.slot(dst), chunk) };
      src += chunk as isize;
      dst += chunk as isize;
      count -= chunk;
    }
  }

  /// Moves `[first, last)` so that it ends at `dst_last`, back to front. Safe
  /// for overlap when `dst_last` is after `last`.
  unsafe fn move_backward(&self, first: Cursor, mut last: Cursor, mut dst_last: Cursor) {
    let mut count = (last - first) as usize;
    while count > 0 {
      let src_room = if last.offset == 0 { BUFFER_SIZE } else { last.offset };
      let dst_room = if dst_last.offset == 0 { BUFFER_SIZE } else { dst_last.offset };
      let chunk = count.min(src_room).min(dst_room);
      last -= chunk as isize;
      dst_last -= chunk as isize;
      unsafe { ptr::copy(self.slot(last), self.slot(dst_last), chunk) };
      count -= chunk;
    }
  }

  /// Drops the elements in `[first, last)`, buffer by buffer.
  unsafe fn drop_range(&self, mut first: Cursor, last: Cursor) {
    if !mem::needs_drop::<T>() {
      return;
    }
    let buffers = self.buffers();
    while first < last {
      let end = if first.node == last.node { last.offset } else { BUFFER_SIZE };
      unsafe {
        let base = self.buffer(first.node);
        buffers.destroy_range(
          NonNull::new_unchecked(base.add(first.offset)),
          NonNull::new_unchecked(base.add(end)),
        );
      }
      first = Cursor::new(first.node + 1, 0);
    }
  }

  // ===========================================================================
  // Size and access
  // ===========================================================================

  #[inline]
  pub fn len(&self) -> usize {
    (self.finish - self.start) as usize
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.start == self.finish
  }

  /// Position of the first element.
  #[inline]
  pub fn begin(&self) -> Cursor {
    self.start
  }

  /// Position one past the last element.
  #[inline]
  pub fn end(&self) -> Cursor {
    self.finish
  }

  /// Position of element `index`; `index == len()` gives [`Deque::end`].
  pub fn cursor(&self, index: usize) -> Cursor {
    debug_assert!(index <= self.len());
    self.start + index as isize
  }

  /// Buffers referenced by the used part of the control array.
  pub fn buffer_count(&self) -> usize {
    self.finish.node - self.start.node + 1
  }

  /// Slots in the control array, used or not.
  pub fn map_capacity(&self) -> usize {
    self.map_size
  }

  pub fn allocator(&self) -> &A {
    &self.alloc
  }

  #[inline]
  fn contains(&self, at: Cursor) -> bool {
    self.start <= at && at < self.finish
  }

  pub fn get_at(&self, at: Cursor) -> Option<&T> {
    if self.contains(at) { Some(unsafe { &*self.slot(at) }) } else { None }
  }

  pub fn get_at_mut(&mut self, at: Cursor) -> Option<&mut T> {
    if self.contains(at) { Some(unsafe { &mut *self.slot(at) }) } else { None }
  }

  pub fn get(&self, index: usize) -> Option<&T> {
    if index < self.len() { self.get_at(self.start + index as isize) } else { None }
  }

  pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
    if index < self.len() { self.get_at_mut(self.start + index as isize) } else { None }
  }

  pub fn front(&self) -> Option<&T> {
    self.get_at(self.start)
  }

  pub fn front_mut(&mut self) -> Option<&mut T> {
    self.get_at_mut(self.start)
  }

  pub fn back(&self) -> Option<&T> {
    if self.is_empty() { None } else { self.get_at(self.finish - 1) }
  }

  pub fn back_mut(&mut self) -> Option<&mut T> {
    if self.is_empty() { None } else { self.get_at_mut(self.finish - 1) }
  }

  pub fn iter(&self) -> Iter<'_, T> {
    Iter::new(self.map, self.start, self.finish)
  }

  pub fn iter_mut(&mut self) -> IterMut<'_, T> {
    IterMut::new(self.map, self.start, self.finish)
  }

  /// Identity comparison: same control array and same edges. Two deques only
  /// compare equal here if they are the same deque.
  pub fn ptr_eq(&self, other: &Self) -> bool {
    self.map == other.map
      && self.map_size == other.map_size
      && self.start == other.start
      && self.finish == other.finish
  }

  // ===========================================================================
  // Edges
  // ===========================================================================

  pub fn push_back(&mut self, value: T) {
    self.try_push_back(value).unwrap_or_else(|err| err.handle())
  }

  pub fn try_push_back(&mut self, value: T) -> Result<(), AllocError> {
    if self.finish.offset != BUFFER_SIZE - 1 {
      unsafe { self.slot(self.finish).write(value) };
      self.finish.offset += 1;
      return Ok(());
    }

    // Last slot of the back buffer: `finish` moves on to a fresh buffer.
    self.reserve_map_at_back(1)?;
    let buffer = self.allocate_buffer()?;
    unsafe {
      self.set_buffer(self.finish.node + 1, buffer);
      self.slot(self.finish).write(value);
    }
    self.finish.inc();
    Ok(())
  }

  pub fn push_front(&mut self, value: T) {
    self.try_push_front(value).unwrap_or_else(|err| err.handle())
  }

  pub fn try_push_front(&mut self, value: T) -> Result<(), AllocError> {
    if self.start.offset != 0 {
      self.start.offset -= 1;
      unsafe { self.slot(self.start).write(value) };
      return Ok(());
    }

    self.reserve_map_at_front(1)?;
    let buffer = self.allocate_buffer()?;
    unsafe { self.set_buffer(self.start.node - 1, buffer) };
    self.start.dec();
    unsafe { self.slot(self.start).write(value) };
    Ok(())
  }

  pub fn pop_back(&mut self) -> Option<T> {
    if self.is_empty() {
      return None;
    }
    if self.finish.offset == 0 {
      // The finish buffer holds nothing; release it and step back.
      unsafe { self.deallocate_buffer(self.finish.node) };
    }
    self.finish.dec();
    Some(unsafe { self.slot(self.finish).read() })
  }

  pub fn pop_front(&mut self) -> Option<T> {
    if self.is_empty() {
      return None;
    }
    let value = unsafe { self.slot(self.start).read() };
    if self.start.offset == BUFFER_SIZE - 1 {
      // Last element of the front buffer. `finish` is in a later buffer.
      debug_assert!(self.start.node < self.finish.node);
      unsafe { self.deallocate_buffer(self.start.node) };
    }
    self.start.inc();
    Some(value)
  }

  // ===========================================================================
  // Insert / erase
  // ===========================================================================

  /// Inserts `value` before `pos` and returns the position it landed at.
  ///
  /// # Panics
  ///
  /// If `pos` is outside `[begin(), end()]`.
  pub fn insert(&mut self, pos: Cursor, value: T) -> Cursor {
    self.try_insert(pos, value).unwrap_or_else(|err| err.handle())
  }

  pub fn try_insert(&mut self, pos: Cursor, value: T) -> Result<Cursor, AllocError> {
    let index = self.index_of(pos);
    if index == 0 {
      self.try_push_front(value)?;
      return Ok(self.start);
    }
    if index == self.len() {
      self.try_push_back(value)?;
      return Ok(self.finish - 1);
    }
    let gap = self.open_gap(index, 1)?;
    unsafe { self.slot(gap).write(value) };
    Ok(gap)
  }

  /// Inserts `n` clones of `value` before `pos`. Returns the position of the
  /// first one.
  pub fn insert_n(&mut self, pos: Cursor, n: usize, value: T) -> Cursor
  where
    T: Clone,
  {
    self.try_insert_n(pos, n, value).unwrap_or_else(|err| err.handle())
  }

  pub fn try_insert_n(&mut self, pos: Cursor, n: usize, value: T) -> Result<Cursor, AllocError>
  where
    T: Clone,
  {
    let index = self.index_of(pos);
    // Clone everything before touching the structure.
    let mut staged = Vector::new_in(&self.alloc);
    staged.try_extend(repeat_n(value, n))?;
    let (values, len, cap, _) = staged.into_raw_parts_with_alloc();
    unsafe { self.insert_staged(index, values, len, cap) }
  }

  /// Inserts the items of `iter`, in order, before `pos`. Returns the position
  /// of the first one.
  pub fn insert_iter<I: IntoIterator<Item = T>>(&mut self, pos: Cursor, iter: I) -> Cursor {
    self.try_insert_iter(pos, iter).unwrap_or_else(|err| err.handle())
  }

  pub fn try_insert_iter<I: IntoIterator<Item = T>>(
    &mut self,
    pos: Cursor,
    iter: I,
  ) -> Result<Cursor, AllocError> {
    let index = self.index_of(pos);
    // The source may panic or lie about its length; drain it first.
    let mut staged = Vector::new_in(&self.alloc);
    staged.try_extend(iter)?;
    let (values, len, cap, _) = staged.into_raw_parts_with_alloc();
    unsafe { self.insert_staged(index, values, len, cap) }
  }

  /// Index of `pos`, which may be `end()`.
  #[inline]
  fn index_of(&self, pos: Cursor) -> usize {
    assert!(self.start <= pos && pos <= self.finish, "cursor {pos:?} outside the deque");
    (pos - self.start) as usize
  }

  /// Moves the values of a staging vector into a gap opened at `index`. The
  /// staging storage goes back to the deque's allocator; on failure the
  /// staged values are dropped with it.
  ///
  /// # Safety
  ///
  /// `(values, len, cap)` are the raw parts of a vector on `&self.alloc`.
  unsafe fn insert_staged(
    &mut self,
    index: usize,
    values: NonNull<T>,
    len: usize,
    cap: usize,
  ) -> Result<Cursor, AllocError> {
    let opened = self.open_gap(index, len);
    let mut staged = unsafe { Vector::from_raw_parts_in(values, len, cap, &self.alloc) };
    let gap = opened?;

    let mut src = staged.as_ptr();
    let mut dst = gap;
    let mut left = len;
    while left > 0 {
      let chunk = left.min(BUFFER_SIZE - dst.offset);
      unsafe {
        ptr::copy_nonoverlapping(src, self.slot(dst), chunk);
        src = src.add(chunk);
      }
      dst += chunk as isize;
      left -= chunk;
    }
    // The values now live in the deque.
    unsafe { staged.set_len(0) };
    Ok(gap)
  }

  /// Opens a gap of `n` uninitialized slots at `index` by shifting the
  /// shorter side outwards, and returns its first position. The caller must
  /// fill the gap before anything can observe the deque.
  fn open_gap(&mut self, index: usize, n: usize) -> Result<Cursor, AllocError> {
    let len = self.len();
    debug_assert!(index <= len);
    if n == 0 {
      return Ok(self.start + index as isize);
    }

    if index < len - index {
      // Fewer elements in front: slide them `n` slots towards the front.
      let new_start = self.reserve_elements_at_front(n)?;
      unsafe { self.move_forward(self.start, new_start, index) };
      self.start = new_start;
      Ok(new_start + index as isize)
    } else {
      // Fewer elements behind: slide them `n` slots towards the back.
      let new_finish = self.reserve_elements_at_back(n)?;
      let pos = self.start + index as isize;
      unsafe { self.move_backward(pos, self.finish, new_finish) };
      self.finish = new_finish;
      Ok(pos)
    }
  }

  /// Removes the element at `pos`. Returns the position of the element that
  /// followed it.
  ///
  /// # Panics
  ///
  /// If `pos` is not the position of an element.
  pub fn erase(&mut self, pos: Cursor) -> Cursor {
    self.erase_range(pos, pos + 1)
  }

  /// Removes `[first, last)`. Returns the position of the element that
  /// followed the range. Never allocates.
  ///
  /// # Panics
  ///
  /// If the range is not inside `[begin(), end()]`. A panicking destructor
  /// is propagated after the survivors have been shifted together.
  pub fn erase_range(&mut self, first: Cursor, last: Cursor) -> Cursor {
    let before = self.index_of(first);
    assert!(first <= last && last <= self.finish, "range {first:?}..{last:?} outside the deque");
    let n = (last - first) as usize;
    if n == 0 {
      return first;
    }
    if n == self.len() {
      self.clear();
      return self.finish;
    }

    let gap = CloseGap { deque: &mut *self, first, last };
    unsafe { gap.deque.drop_range(first, last) };
    drop(gap);
    self.start + before as isize
  }

  /// Shifts the shorter side over the dead slots `[first, last)` and releases
  /// the buffers that fall out of the used range.
  unsafe fn close_gap(&mut self, first: Cursor, last: Cursor) {
    let n = last - first;
    let before = (first - self.start) as usize;
    let after = (self.finish - last) as usize;

    if before < after {
      unsafe { self.move_backward(self.start, first, last) };
      let new_start = self.start + n;
      for node in self.start.node..new_start.node {
        unsafe { self.deallocate_buffer(node) };
      }
      self.start = new_start;
    } else {
      unsafe { self.move_forward(last, first, after) };
      let new_finish = self.finish - n;
      for node in new_finish.node + 1..=self.finish.node {
        unsafe { self.deallocate_buffer(node) };
      }
      self.finish = new_finish;
    }
  }

  /// Drops every element and every buffer but the front one, which is kept
  /// as the empty deque's buffer with both edges at its origin.
  pub fn clear(&mut self) {
    let (first, last) = (self.start, self.finish);
    self.start = Cursor::new(first.node, 0);
    self.finish = self.start;
    unsafe {
      self.drop_range(first, last);
      for node in first.node + 1..=last.node {
        self.deallocate_buffer(node);
      }
    }
  }
}

impl<T, A: RawAllocator> Drop for Deque<T, A> {
  fn drop(&mut self) {
    unsafe {
      self.drop_range(self.start, self.finish);
      for node in self.start.node..=self.finish.node {
        self.deallocate_buffer(node);
      }
      self.maps().deallocate(self.map, self.map_size);
    }
  }
}

/// Closes the gap left by `erase_range` once the doomed values are dropped,
/// or while a panic from one of their destructors unwinds.
struct CloseGap<'a, T, A: RawAllocator> {
  deque: &'a mut Deque<T, A>,
  first: Cursor,
  last: Cursor,
}

impl<T, A: RawAllocator> Drop for CloseGap<'_, T, A> {
  fn drop(&mut self) {
    unsafe { self.deque.close_gap(self.first, self.last) };
  }
}

// =============================================================================
// Trait impls
// =============================================================================

impl<T: Clone, A: RawAllocator + Clone> Clone for Deque<T, A> {
  fn clone(&self) -> Self {
    Self::try_from_iter_in(self.iter().cloned(), self.alloc.clone()).unwrap_or_else(|err| err.handle())
  }
}

impl<T: fmt::Debug, A: RawAllocator> fmt::Debug for Deque<T, A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_list().entries(self.iter()).finish()
  }
}

impl<T: PartialEq, A: RawAllocator, B: RawAllocator> PartialEq<Deque<T, B>> for Deque<T, A> {
  fn eq(&self, other: &Deque<T, B>) -> bool {
    self.len() == other.len() && self.iter().eq(other.iter())
  }
}

impl<T: Eq, A: RawAllocator> Eq for Deque<T, A> {}

impl<T, A: RawAllocator> Index<usize> for Deque<T, A> {
  type Output = T;

  fn index(&self, index: usize) -> &T {
    let len = self.len();
    match self.get(index) {
      Some(value) => value,
      None => panic!("index out of bounds: the len is {len} but the index is {index}"),
    }
  }
}

impl<T, A: RawAllocator> IndexMut<usize> for Deque<T, A> {
  fn index_mut(&mut self, index: usize) -> &mut T {
    let len = self.len();
    match self.get_mut(index) {
      Some(value) => value,
      None => panic!("index out of bounds: the len is {len} but the index is {index}"),
    }
  }
}

impl<T, A: RawAllocator> Index<Cursor> for Deque<T, A> {
  type Output = T;

  fn index(&self, at: Cursor) -> &T {
    match self.get_at(at) {
      Some(value) => value,
      None => panic!("cursor {at:?} outside the deque"),
    }
  }
}

impl<T, A: RawAllocator> IndexMut<Cursor> for Deque<T, A> {
  fn index_mut(&mut self, at: Cursor) -> &mut T {
    match self.get_at_mut(at) {
      Some(value) => value,
      None => panic!("cursor {at:?} outside the deque"),
    }
  }
}

impl<T> FromIterator<T> for Deque<T> {
  fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
    Self::try_from_iter_in(iter, Global).unwrap_or_else(|err| err.handle())
  }
}

impl<T, A: RawAllocator> Extend<T> for Deque<T, A> {
  fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
    for value in iter {
      self.push_back(value);
    }
  }
}
