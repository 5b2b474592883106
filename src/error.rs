//! Allocator error types and the stable error-code enumeration.

use std::io;

/// Status reported by [`Heap::last_error`](crate::Heap::last_error).
///
/// The discriminants are stable and match the values exposed through
/// [`global::last_error`](crate::global::last_error).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
  #[default]
  None = 0,
  /// The arena could not be obtained from the OS.
  MmapFailed = -1,
  /// The arena is exhausted, or zero bytes were requested.
  OutOfMemory = -2,
  /// `free` was given a pointer outside the live arena range.
  InvalidFree = -3,
}

impl ErrorCode {
  pub fn as_raw(self) -> i32 {
    self as i32
  }
}

/// Failure of [`Heap::allocate`](crate::Heap::allocate).
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
  #[error("cannot allocate 0 bytes")]
  InvalidSize,

  #[error("could not map the arena: {source}")]
  ArenaInitFailed {
    #[source]
    source: io::Error,
  },

  #[error("heap out of memory: requested {requested} bytes, remaining {remaining}")]
  OutOfMemory { requested: usize, remaining: usize },
}

impl AllocError {
  /// Zero-size requests share `OutOfMemory` with exhaustion at the code level.
  pub fn code(&self) -> ErrorCode {
    match self {
      Self::InvalidSize | Self::OutOfMemory { .. } => ErrorCode::OutOfMemory,
      Self::ArenaInitFailed { .. } => ErrorCode::MmapFailed,
    }
  }
}

/// Failure of [`Heap::free`](crate::Heap::free).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FreeError {
  #[error("invalid free pointer {addr:#x}")]
  InvalidFree { addr: usize },
}

impl FreeError {
  pub fn code(&self) -> ErrorCode {
    match self {
      Self::InvalidFree { .. } => ErrorCode::InvalidFree,
    }
  }
}
