use std::{alloc::Layout, cell::Cell, collections::VecDeque, ptr::NonNull};

use pooled_deque::{AllocError, BUFFER_SIZE, Deque, RawAllocator, SizeClassAllocator};

/// Wraps a [`SizeClassAllocator`] and counts live blocks. With 4-byte
/// elements, buffers are the only 4-aligned blocks a deque allocates; the
/// control array holds pointers.
struct Counting {
  heap: SizeClassAllocator,
  buffers: Cell<isize>,
  maps: Cell<isize>,
}

impl Counting {
  fn new() -> Self {
    Self::over(SizeClassAllocator::new())
  }

  fn over(heap: SizeClassAllocator) -> Self {
    Self { heap, buffers: Cell::new(0), maps: Cell::new(0) }
  }

  fn counter(&self, layout: Layout) -> &Cell<isize> {
    if layout.align() == align_of::<u32>() { &self.buffers } else { &self.maps }
  }
}

unsafe impl RawAllocator for Counting {
  fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
    let ptr = self.heap.allocate(layout.size())?;
    let counter = self.counter(layout);
    counter.set(counter.get() + 1);
    Ok(ptr)
  }

  unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
    let counter = self.counter(layout);
    counter.set(counter.get() - 1);
    unsafe { self.heap.deallocate(ptr, layout.size()) };
  }
}

/// Small deterministic generator so failures reproduce.
struct Lcg(u64);

impl Lcg {
  fn next(&mut self) -> u32 {
    self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (self.0 >> 33) as u32
  }

  fn below(&mut self, n: usize) -> usize {
    self.next() as usize % n
  }
}

fn assert_same(deque: &Deque<u32, &Counting>, model: &VecDeque<u32>) {
  assert_eq!(deque.len(), model.len());
  assert!(deque.iter().eq(model.iter()));
  assert!(deque.iter().rev().eq(model.iter().rev()));
}

#[test]
fn matches_a_reference_deque() {
  let counting = Counting::new();
  let mut deque = Deque::new_in(&counting);
  let mut model = VecDeque::new();
  let mut rng = Lcg(0x5eed);

  for step in 0..30_000 {
    let value = rng.next();
    match rng.below(10) {
      0 | 1 => {
        deque.push_back(value);
        model.push_back(value);
      }
      2 | 3 => {
        deque.push_front(value);
        model.push_front(value);
      }
      4 => assert_eq!(deque.pop_back(), model.pop_back()),
      5 => assert_eq!(deque.pop_front(), model.pop_front()),
      6 => {
        let i = rng.below(model.len() + 1);
        let at = deque.insert(deque.cursor(i), value);
        model.insert(i, value);
        assert_eq!(at, deque.cursor(i));
        assert_eq!(deque[at], value);
      }
      7 if !model.is_empty() => {
        let i = rng.below(model.len());
        let next = deque.erase(deque.cursor(i));
        model.remove(i);
        assert_eq!(next, deque.cursor(i));
      }
      8 => {
        let i = rng.below(model.len() + 1);
        let n = rng.below(3 * BUFFER_SIZE);
        let values: Vec<u32> = (0..n as u32).map(|k| value.wrapping_add(k)).collect();
        let at = deque.insert_iter(deque.cursor(i), values.iter().copied());
        for (k, &v) in values.iter().enumerate() {
          model.insert(i + k, v);
        }
        assert_eq!(at, deque.cursor(i));
      }
      9 if !model.is_empty() => {
        let i = rng.below(model.len());
        let j = i + rng.below((model.len() - i).min(3 * BUFFER_SIZE) + 1);
        let next = deque.erase_range(deque.cursor(i), deque.cursor(j));
        model.drain(i..j);
        assert_eq!(next, deque.cursor(i));
      }
      _ => {}
    }

    assert_eq!(counting.buffers.get(), deque.buffer_count() as isize, "step {step}");
    assert_eq!(counting.maps.get(), 1);
    if step % 101 == 0 {
      assert_same(&deque, &model);
    }
  }
  assert_same(&deque, &model);

  drop(deque);
  assert_eq!(counting.buffers.get(), 0);
  assert_eq!(counting.maps.get(), 0);
}

#[test]
fn cursor_distance_agrees_with_indices() {
  let mut deque: Deque<u32> = Deque::new();
  for i in 0..45 {
    if i % 3 == 0 { deque.push_front(i) } else { deque.push_back(i) }
  }
  let len = deque.len();
  for i in 0..=len {
    for j in 0..=len {
      let (a, b) = (deque.cursor(i), deque.cursor(j));
      assert_eq!(b - a, j as isize - i as isize);
      assert_eq!(a + (j as isize - i as isize), b);
    }
  }
}

#[test]
fn growth_keeps_every_value_in_place() {
  let counting = Counting::new();
  let mut back = Deque::new_in(&counting);
  for i in 0..1600 {
    back.push_back(i);
  }
  assert!((0..1600).all(|i| back[i as usize] == i));

  let mut front = Deque::new_in(&counting);
  for i in 0..1600 {
    front.push_front(i);
  }
  assert!((0..1600).all(|i| front[1599 - i as usize] == i));

  let live = (back.buffer_count() + front.buffer_count()) as isize;
  assert_eq!(counting.buffers.get(), live);
  assert_eq!(back.buffer_count(), 1600 / BUFFER_SIZE + 1);
}

#[test]
fn draining_leaves_exactly_one_buffer() {
  let counting = Counting::new();
  let mut deque = Deque::new_in(&counting);
  for i in 0..1000 {
    deque.push_back(i);
  }
  while deque.pop_front().is_some() {}
  assert_eq!(deque.buffer_count(), 1);
  assert_eq!(counting.buffers.get(), 1);

  for i in 0..1000 {
    deque.push_front(i);
  }
  while deque.pop_back().is_some() {}
  assert_eq!(deque.buffer_count(), 1);
  assert_eq!(counting.buffers.get(), 1);
}

#[test]
fn alternating_front_push_and_back_pop_recentres() {
  let counting = Counting::new();
  let mut deque = Deque::new_in(&counting);
  for i in 0..40 {
    deque.push_back(i);
  }
  let mut capacity = 0;
  for i in 0..50_000 {
    deque.push_front(i);
    deque.pop_back();
    if i == 1_000 {
      capacity = deque.map_capacity();
    }
  }
  // The window drifts towards slot 0 forever; the map must not keep growing.
  assert_eq!(deque.map_capacity(), capacity);
  assert_eq!(deque.len(), 40);
  assert_eq!(counting.buffers.get(), deque.buffer_count() as isize);
  assert_eq!(counting.maps.get(), 1);
  assert_eq!(deque.front(), Some(&49_999));
}

#[test]
fn failed_growth_changes_nothing() {
  let counting = Counting::over(SizeClassAllocator::with_heap_limit(4096));
  let mut deque = Deque::new_in(&counting);
  let mut n = 0u32;
  while deque.try_push_back(n).is_ok() {
    n += 1;
  }
  let buffers = counting.buffers.get();
  assert_eq!(buffers, deque.buffer_count() as isize);

  let before: Vec<u32> = deque.iter().copied().collect();
  let mid = deque.cursor(deque.len() / 2);
  assert!(deque.try_insert_iter(mid, 0..1000).is_err());
  assert!(deque.iter().copied().eq(before.iter().copied()));
  assert_eq!(counting.buffers.get(), deque.buffer_count() as isize);
}

#[test]
fn failed_insert_n_changes_nothing() {
  let counting = Counting::over(SizeClassAllocator::with_heap_limit(4096));
  let mut deque = Deque::new_in(&counting);
  let mut n = 0u32;
  while deque.try_push_back(n).is_ok() {
    n += 1;
  }

  let before: Vec<u32> = deque.iter().copied().collect();
  for at in [1, deque.len() / 2, deque.len() - 1] {
    let err = deque.try_insert_n(deque.cursor(at), 1000, u32::MAX).unwrap_err();
    assert!(matches!(err, AllocError::PoolExhausted { .. }), "{err}");
    assert!(deque.iter().copied().eq(before.iter().copied()));
    // The staged clones went back to the allocator too.
    assert_eq!(counting.buffers.get(), deque.buffer_count() as isize);
  }
}

#[test]
fn clear_then_reuse() {
  let counting = Counting::new();
  let mut deque: Deque<u32, _> = Deque::try_from_iter_in(0..100, &counting).unwrap();
  deque.clear();
  assert!(deque.is_empty());
  assert_eq!(counting.buffers.get(), 1);
  deque.extend(0..20);
  assert!(deque.iter().copied().eq(0..20));
  let copy = deque.clone();
  assert_eq!(copy, deque);
  assert_eq!(counting.buffers.get(), (deque.buffer_count() + copy.buffer_count()) as isize);
}

#[test]
fn insert_then_erase_restores_the_sequence() {
  let counting = Counting::new();
  for len in [0usize, 1, 7, 8, 9, 31, 64] {
    let original: Vec<u32> = (0..len as u32).collect();
    for k in [1usize, 3, 8, 17] {
      for p in 0..=len {
        let mut deque: Deque<u32, _> = Deque::try_from_iter_in(original.iter().copied(), &counting).unwrap();
        let at = deque.insert_n(deque.cursor(p), k, u32::MAX);
        assert_eq!(deque.len(), len + k);
        assert!(deque.iter().skip(p).take(k).all(|&v| v == u32::MAX));
        let next = deque.erase_range(at, at + k as isize);
        assert_eq!(next, deque.cursor(p));
        assert!(deque.iter().copied().eq(original.iter().copied()), "len {len}, k {k}, p {p}");
        assert_eq!(counting.buffers.get(), deque.buffer_count() as isize);
      }
    }
  }
  assert_eq!(counting.buffers.get(), 0);
}
