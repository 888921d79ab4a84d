use core::alloc::Layout;

/// Allocation failure surfaced by the pool, the allocators and every container
/// built on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
  /// The pool could not grow and no free cell of at least this size was left.
  #[error("size-class pool exhausted while requesting {requested} bytes")]
  PoolExhausted {
    /// Bytes the refill asked the pool for.
    requested: usize,
  },
  /// The system allocator refused an oversized or over-aligned request.
  #[error("system allocator refused {size} bytes (align {align})")]
  System { size: usize, align: usize },
  /// Element count times element size does not fit in a `Layout`.
  #[error("capacity overflow")]
  CapacityOverflow,
}

impl AllocError {
  /// Diverges the way std collections do on allocation failure.
  #[cold]
  pub(crate) fn handle(self) -> ! {
    let layout = match self {
      AllocError::PoolExhausted { requested } => Layout::from_size_align(requested, crate::ALIGN),
      AllocError::System { size, align } => Layout::from_size_align(size, align),
      AllocError::CapacityOverflow => panic!("capacity overflow"),
    };
    match layout {
      Ok(layout) => std::alloc::handle_alloc_error(layout),
      Err(_) => panic!("{self}"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn messages() {
    assert_eq!(
      AllocError::PoolExhausted { requested: 160 }.to_string(),
      "size-class pool exhausted while requesting 160 bytes"
    );
    assert_eq!(
      AllocError::System { size: 4096, align: 64 }.to_string(),
      "system allocator refused 4096 bytes (align 64)"
    );
  }

  #[test]
  #[should_panic(expected = "capacity overflow")]
  fn overflow_panics() {
    AllocError::CapacityOverflow.handle();
  }
}
