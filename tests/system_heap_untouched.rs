//! Containers on a `SizeClassAllocator` stage and erase without the process
//! heap. A counting `#[global_allocator]` records every system request made
//! on the current thread.

use std::{
  alloc::{GlobalAlloc, Layout, System},
  cell::Cell,
};

use pooled_deque::{Deque, SizeClassAllocator};

struct CountingSystem;

thread_local! {
  static SYSTEM_ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

unsafe impl GlobalAlloc for CountingSystem {
  unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
    let _ = SYSTEM_ALLOCATIONS.try_with(|count| count.set(count.get() + 1));
    unsafe { System.alloc(layout) }
  }

  unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
    unsafe { System.dealloc(ptr, layout) }
  }
}

#[global_allocator]
static GLOBAL: CountingSystem = CountingSystem;

fn system_allocations_during(f: impl FnOnce()) -> usize {
  let before = SYSTEM_ALLOCATIONS.with(Cell::get);
  f();
  SYSTEM_ALLOCATIONS.with(Cell::get) - before
}

#[test]
fn erase_range_drops_in_place() {
  let heap = SizeClassAllocator::new();
  let mut deque: Deque<Box<u8>, _> = Deque::new_in(&heap);
  for i in 0..120 {
    deque.push_back(Box::new(i));
  }
  // Warm up both shift directions first.
  deque.erase_range(deque.cursor(100), deque.cursor(110));
  deque.erase_range(deque.cursor(1), deque.cursor(2));

  let count = system_allocations_during(|| {
    deque.erase_range(deque.cursor(10), deque.cursor(50));
    deque.erase_range(deque.cursor(40), deque.cursor(60));
  });
  assert_eq!(count, 0);
  assert_eq!(deque.len(), 49);
  assert_eq!(*deque[10], 51);
  assert_eq!(*deque[40], 111);
}

#[test]
fn insert_n_stages_on_the_deque_allocator() {
  let heap = SizeClassAllocator::new();
  let mut deque: Deque<Box<u8>, _> = Deque::new_in(&heap);
  for i in 0..40 {
    deque.push_back(Box::new(i));
  }
  deque.insert_n(deque.cursor(20), 2, Box::new(0));

  let value = Box::new(7);
  let count = system_allocations_during(|| {
    deque.insert_n(deque.cursor(5), 3, value);
  });
  // Only the two clones reach the process heap.
  assert_eq!(count, 2);
  assert!(deque.iter().skip(5).take(3).all(|v| **v == 7));
  assert_eq!(deque.len(), 45);
}

#[test]
fn insert_iter_stages_on_the_deque_allocator() {
  let heap = SizeClassAllocator::new();
  let mut deque: Deque<u32, _> = Deque::try_from_iter_in(0..64, &heap).unwrap();
  deque.insert_iter(deque.cursor(60), [1, 2]);

  let count = system_allocations_during(|| {
    deque.insert_iter(deque.cursor(3), 100..140);
    deque.insert_iter(deque.cursor(50), (0..5).filter(|v| v % 2 == 0));
  });
  assert_eq!(count, 0);
  assert_eq!(deque.len(), 66 + 40 + 3);
  assert!(deque.iter().skip(3).take(40).copied().eq(100..140));
}
