use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use pooled_deque::Deque;
use std::{collections::VecDeque, hint::black_box};

const OPS: u64 = 100_000;

fn deque_push_pop(n: u64) {
  let mut deque = Deque::new();
  for i in 0..n {
    if i % 2 == 0 { deque.push_back(i) } else { deque.push_front(i) }
  }
  while let Some(v) = deque.pop_front() {
    black_box(v);
  }
}

fn vecdeque_push_pop(n: u64) {
  let mut deque = VecDeque::new();
  for i in 0..n {
    if i % 2 == 0 { deque.push_back(i) } else { deque.push_front(i) }
  }
  while let Some(v) = deque.pop_front() {
    black_box(v);
  }
}

/// Queue usage: the live window slides through the control array.
fn deque_sliding(n: u64) {
  let mut deque = Deque::new();
  for i in 0..64 {
    deque.push_back(i);
  }
  for i in 0..n {
    deque.push_back(i);
    black_box(deque.pop_front());
  }
}

fn vecdeque_sliding(n: u64) {
  let mut deque = VecDeque::new();
  for i in 0..64 {
    deque.push_back(i);
  }
  for i in 0..n {
    deque.push_back(i);
    black_box(deque.pop_front());
  }
}

fn benchmark_deque_throughput(c: &mut Criterion) {
  let mut group = c.benchmark_group("deque_throughput");
  group.throughput(Throughput::Elements(OPS));

  group.bench_with_input(BenchmarkId::new("pooled", "push_pop"), &OPS, |b, &n| {
    b.iter(|| deque_push_pop(n))
  });
  group.bench_with_input(BenchmarkId::new("std", "push_pop"), &OPS, |b, &n| {
    b.iter(|| vecdeque_push_pop(n))
  });
  group.bench_with_input(BenchmarkId::new("pooled", "sliding"), &OPS, |b, &n| {
    b.iter(|| deque_sliding(n))
  });
  group.bench_with_input(BenchmarkId::new("std", "sliding"), &OPS, |b, &n| {
    b.iter(|| vecdeque_sliding(n))
  });

  group.finish();

  let mut group = c.benchmark_group("deque_middle_insert");
  for len in [64usize, 1024] {
    group.throughput(Throughput::Elements(len as u64));
    group.bench_with_input(BenchmarkId::new("pooled", len), &len, |b, &len| {
      b.iter(|| {
        let mut deque: Deque<usize> = (0..len).collect();
        for i in 0..len {
          let at = deque.cursor(deque.len() / 2);
          deque.insert(at, i);
        }
        black_box(deque.len())
      })
    });
    group.bench_with_input(BenchmarkId::new("std", len), &len, |b, &len| {
      b.iter(|| {
        let mut deque: VecDeque<usize> = (0..len).collect();
        for i in 0..len {
          deque.insert(deque.len() / 2, i);
        }
        black_box(deque.len())
      })
    });
  }
  group.finish();
}

criterion_group!(benches, benchmark_deque_throughput);
criterion_main!(benches);
