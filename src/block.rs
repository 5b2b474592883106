use std::{mem, ptr};

use crate::align;

/// Bytes occupied by a header in front of every payload.
pub const HEADER_SIZE: usize = align!(mem::size_of::<usize>());

const FREE_BIT: usize = 1;

/// Decoded form of a block header.
///
/// Physically a header is a single word: the payload size in the high bits
/// and the free flag in bit 0. Sizes are always multiples of
/// [`ALIGNMENT`](crate::align::ALIGNMENT), so bit 0 of the size is zero and
/// can carry the flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
  pub size: usize,
  pub is_free: bool,
}

impl Header {
  pub fn new(
    size: usize,
    is_free: bool,
  ) -> Self {
    debug_assert_eq!(size, align!(size), "unaligned block size {size}");
    Self { size, is_free }
  }

  pub fn allocated(size: usize) -> Self {
    Self::new(size, false)
  }

  pub fn encode(self) -> usize {
    (self.size & !FREE_BIT) | if self.is_free { FREE_BIT } else { 0 }
  }

  pub fn decode(word: usize) -> Self {
    Self {
      size: word & !FREE_BIT,
      is_free: word & FREE_BIT != 0,
    }
  }

  /// Reads the header stored at `at`.
  ///
  /// # Safety
  ///
  /// `at` must be valid for reading `HEADER_SIZE` bytes.
  pub unsafe fn read(at: *const u8) -> Self {
    Self::decode(unsafe { ptr::read_unaligned(at.cast::<usize>()) })
  }

  /// Writes this header at `at`.
  ///
  /// # Safety
  ///
  /// `at` must be valid for writing `HEADER_SIZE` bytes.
  pub unsafe fn write(
    self,
    at: *mut u8,
  ) {
    unsafe { ptr::write_unaligned(at.cast::<usize>(), self.encode()) };
  }

  /// Sets or clears the free flag of the header at `at`, leaving the size
  /// bits untouched.
  ///
  /// # Safety
  ///
  /// `at` must be valid for reading and writing `HEADER_SIZE` bytes.
  pub unsafe fn set_free(
    at: *mut u8,
    is_free: bool,
  ) {
    let word = unsafe { ptr::read_unaligned(at.cast::<usize>()) };
    let word = if is_free { word | FREE_BIT } else { word & !FREE_BIT };
    unsafe { ptr::write_unaligned(at.cast::<usize>(), word) };
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::align::ALIGNMENT;

  #[test]
  fn header_is_one_word() {
    assert_eq!(HEADER_SIZE, mem::size_of::<usize>());
    assert_eq!(HEADER_SIZE % ALIGNMENT, 0);
  }

  #[test]
  fn flag_lives_in_the_low_bit() {
    assert_eq!(Header::new(24, false).encode(), 24);
    assert_eq!(Header::new(24, true).encode(), 25);
    assert_eq!(Header::decode(25), Header::new(24, true));
    assert_eq!(Header::decode(24), Header::allocated(24));
  }

  #[test]
  fn size_bits_never_include_the_flag() {
    let header = Header::decode(usize::MAX);
    assert!(header.is_free);
    assert_eq!(header.size & 1, 0);
  }

  #[test]
  fn set_free_keeps_size() {
    let mut word = [0u8; HEADER_SIZE];
    let at = word.as_mut_ptr();

    unsafe {
      Header::allocated(1000).write(at);
      Header::set_free(at, true);
      assert_eq!(Header::read(at), Header::new(1000, true));

      Header::set_free(at, false);
      assert_eq!(Header::read(at), Header::allocated(1000));
    }
  }
}
