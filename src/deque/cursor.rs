use core::{
  cmp::Ordering,
  ops::{Add, AddAssign, Sub, SubAssign},
};

use super::BUFFER_SIZE;

const B: isize = BUFFER_SIZE as isize;

/// Position in a [`super::Deque`]: a control-array slot and an offset inside
/// the buffer that slot points to.
///
/// Cursors are plain indices. They never touch memory, so the arithmetic is
/// safe on its own; the deque resolves a cursor to an element when asked
/// (`get_at`, `Index<Cursor>`). Any structural change to the deque
/// invalidates the cursors taken from it.
///
/// `offset` is always in `[0, BUFFER_SIZE)`: stepping past the last slot of a
/// buffer lands on offset 0 of the next slot, which is also how the end
/// position of a deque whose back buffer is full is represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cursor {
  pub(crate) node: usize,
  pub(crate) offset: usize,
}

impl Cursor {
  #[inline]
  pub(crate) const fn new(node: usize, offset: usize) -> Self {
    debug_assert!(offset < BUFFER_SIZE);
    Self { node, offset }
  }

  /// Control-array slot of the buffer this cursor points into.
  #[inline]
  pub fn node(&self) -> usize {
    self.node
  }

  /// Position inside the buffer.
  #[inline]
  pub fn offset(&self) -> usize {
    self.offset
  }

  /// Moves to the next position.
  #[inline]
  pub fn inc(&mut self) {
    self.offset += 1;
    if self.offset == BUFFER_SIZE {
      self.node = self.node.wrapping_add(1);
      self.offset = 0;
    }
  }

  /// Moves to the previous position.
  #[inline]
  pub fn dec(&mut self) {
    if self.offset == 0 {
      debug_assert!(self.node > 0, "cursor moved before slot 0");
      self.node = self.node.wrapping_sub(1);
      self.offset = BUFFER_SIZE;
    }
    self.offset -= 1;
  }

  /// Moves `n` positions, backwards when negative.
  pub fn advance(&mut self, n: isize) {
    let offset = self.offset as isize + n;
    if (0..B).contains(&offset) {
      self.offset = offset as usize;
      return;
    }
    // Floor division: a negative offset always crosses at least one slot back.
    let nodes = offset.div_euclid(B);
    self.node = self.node.wrapping_add_signed(nodes);
    self.offset = (offset - nodes * B) as usize;
  }

  /// Number of positions from `other` to `self` (negative when `self` comes
  /// first).
  pub fn distance(&self, other: &Cursor) -> isize {
    // Whole buffers strictly between the two slots, plus the used part of
    // this buffer, plus the remaining part of the other one.
    let nodes = self.node as isize - other.node as isize;
    (nodes - 1) * B + self.offset as isize + (B - other.offset as isize)
  }
}

impl PartialOrd for Cursor {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Cursor {
  fn cmp(&self, other: &Self) -> Ordering {
    self.node.cmp(&other.node).then(self.offset.cmp(&other.offset))
  }
}

impl AddAssign<isize> for Cursor {
  fn add_assign(&mut self, n: isize) {
    self.advance(n);
  }
}

impl SubAssign<isize> for Cursor {
  fn sub_assign(&mut self, n: isize) {
    self.advance(-n);
  }
}

impl Add<isize> for Cursor {
  type Output = Cursor;

  fn add(mut self, n: isize) -> Cursor {
    self.advance(n);
    self
  }
}

impl Sub<isize> for Cursor {
  type Output = Cursor;

  fn sub(mut self, n: isize) -> Cursor {
    self.advance(-n);
    self
  }
}

impl Sub for Cursor {
  type Output = isize;

  fn sub(self, other: Cursor) -> isize {
    self.distance(&other)
  }
}
