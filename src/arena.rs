//! The arena: one fixed-capacity region obtained lazily from a [`PageSource`]
//! and filled front to back by a bump pointer.

use std::{io, ptr::NonNull};

use log::{debug, warn};

use crate::{
  align::ALIGNMENT,
  block::{HEADER_SIZE, Header},
  error::AllocError,
};

/// Capacity of the arena backing [`Heap::new`](crate::Heap::new): 1 MiB.
pub const HEAP_SIZE: usize = 1 << 20;

/// Supplier of the raw memory behind an arena.
///
/// # Safety
///
/// A successful `map(len)` must return a region of `len` zero-filled,
/// readable and writable bytes, aligned to at least
/// [`ALIGNMENT`](crate::align::ALIGNMENT), that stays valid and untouched by
/// anyone else until it is passed back to `unmap`.
pub unsafe trait PageSource {
  fn map(
    &mut self,
    len: usize,
  ) -> io::Result<NonNull<u8>>;

  /// # Safety
  ///
  /// `base` and `len` must come from a previous successful `map` on this
  /// source, and the region must not be used afterwards.
  unsafe fn unmap(
    &mut self,
    base: NonNull<u8>,
    len: usize,
  );
}

/// Private anonymous mappings from `mmap(2)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mmap;

unsafe impl PageSource for Mmap {
  fn map(
    &mut self,
    len: usize,
  ) -> io::Result<NonNull<u8>> {
    let addr = unsafe {
      libc::mmap(
        std::ptr::null_mut(),
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if addr == libc::MAP_FAILED {
      return Err(io::Error::last_os_error());
    }

    NonNull::new(addr.cast::<u8>()).ok_or_else(|| io::Error::other("mmap returned a null mapping"))
  }

  unsafe fn unmap(
    &mut self,
    base: NonNull<u8>,
    len: usize,
  ) {
    if unsafe { libc::munmap(base.as_ptr().cast(), len) } != 0 {
      warn!("munmap({:?}, {}) failed: {}", base, len, io::Error::last_os_error());
    }
  }
}

/// A mapped arena: `start` and `max` are fixed, `end` only moves forward.
///
/// Positions inside the region are kept as byte offsets from `start`.
#[derive(Debug)]
pub struct Region {
  base: NonNull<u8>,
  end: usize,
  capacity: usize,
}

impl Region {
  pub fn start(&self) -> NonNull<u8> {
    self.base
  }

  /// The bump pointer: first byte never handed out.
  pub fn end(&self) -> NonNull<u8> {
    self.at(self.end)
  }

  pub fn max(&self) -> NonNull<u8> {
    self.at(self.capacity)
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes between `start` and `end`, headers included.
  pub fn used(&self) -> usize {
    self.end
  }

  pub fn remaining(&self) -> usize {
    self.capacity - self.end
  }

  pub(crate) fn end_offset(&self) -> usize {
    self.end
  }

  /// Address of the byte `offset` bytes past `start`.
  pub(crate) fn at(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    debug_assert!(offset <= self.capacity, "offset {offset} past arena capacity {}", self.capacity);
    unsafe { self.base.add(offset) }
  }

  /// Offset of `addr` from `start`, if it is not below `start`.
  pub(crate) fn offset_of(
    &self,
    addr: usize,
  ) -> Option<usize> {
    addr.checked_sub(self.base.as_ptr() as usize)
  }

  /// Header of the block whose header starts at `offset`.
  ///
  /// `offset + HEADER_SIZE` must not exceed `end`.
  pub(crate) fn header_at(
    &self,
    offset: usize,
  ) -> Header {
    debug_assert!(offset + HEADER_SIZE <= self.end);
    unsafe { Header::read(self.at(offset).as_ptr()) }
  }

  pub(crate) fn set_free_at(
    &mut self,
    offset: usize,
    is_free: bool,
  ) {
    debug_assert!(offset + HEADER_SIZE <= self.end);
    unsafe { Header::set_free(self.at(offset).as_ptr(), is_free) };
  }

  /// Writes a new allocated block of `aligned_size` payload bytes at `end`
  /// and returns its payload pointer. The only operation that advances `end`.
  pub fn carve(
    &mut self,
    aligned_size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    debug_assert_eq!(aligned_size % ALIGNMENT, 0);

    let total = HEADER_SIZE
      .checked_add(aligned_size)
      .filter(|&total| total <= self.remaining())
      .ok_or(AllocError::OutOfMemory {
        requested: aligned_size,
        remaining: self.remaining(),
      })?;

    let header = self.end;
    unsafe { Header::allocated(aligned_size).write(self.at(header).as_ptr()) };
    self.end += total;

    Ok(self.at(header + HEADER_SIZE))
  }
}

/// Owner of the arena's backing memory.
///
/// Nothing is mapped until [`Arena::ensure_initialized`] is first called.
/// Once mapped, the region is never moved, resized or reset; it is returned
/// to the source when the arena is dropped.
#[derive(Debug)]
pub struct Arena<S: PageSource = Mmap> {
  source: S,
  capacity: usize,
  region: Option<Region>,
}

// The arena is the only owner of its mapping.
unsafe impl<S: PageSource + Send> Send for Arena<S> {}

impl Arena<Mmap> {
  pub const fn new() -> Self {
    Self::with_source(Mmap, HEAP_SIZE)
  }
}

impl Default for Arena<Mmap> {
  fn default() -> Self {
    Self::new()
  }
}

impl<S: PageSource> Arena<S> {
  pub const fn with_source(
    source: S,
    capacity: usize,
  ) -> Self {
    Self {
      source,
      capacity,
      region: None,
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn region(&self) -> Option<&Region> {
    self.region.as_ref()
  }

  pub(crate) fn region_mut(&mut self) -> Option<&mut Region> {
    self.region.as_mut()
  }

  pub fn is_initialized(&self) -> bool {
    self.region.is_some()
  }

  /// Maps the arena on first use; later calls return the existing region.
  ///
  /// On failure the arena stays unmapped, so the next call tries again.
  pub fn ensure_initialized(&mut self) -> Result<&mut Region, AllocError> {
    let region = match self.region.take() {
      Some(region) => region,
      None => self.map_region()?,
    };

    Ok(self.region.insert(region))
  }

  fn map_region(&mut self) -> Result<Region, AllocError> {
    let base = self.source.map(self.capacity).map_err(|source| {
      warn!("could not map {} byte arena: {}", self.capacity, source);
      AllocError::ArenaInitFailed { source }
    })?;

    debug_assert_eq!(base.as_ptr() as usize % ALIGNMENT, 0, "misaligned arena {base:?}");
    debug!("mapped {} byte arena at {:?}", self.capacity, base);

    Ok(Region {
      base,
      end: 0,
      capacity: self.capacity,
    })
  }
}

impl<S: PageSource> Drop for Arena<S> {
  fn drop(&mut self) {
    if let Some(region) = self.region.take() {
      debug!("releasing {} byte arena at {:?}", region.capacity, region.base);
      unsafe { self.source.unmap(region.base, region.capacity) };
    }
  }
}


#[cfg(test)]
mod tests {
  use super::{sources::Counting, *};

  #[test]
  fn nothing_is_mapped_until_first_use() {
    let source = Counting::default();
    let maps = source.maps.clone();
    let arena = Arena::with_source(source, 4096);

    assert!(!arena.is_initialized());
    assert!(arena.region().is_none());
    assert_eq!(maps.get(), 0);
  }

  #[test]
  fn initialization_is_idempotent() {
    let source = Counting::default();
    let maps = source.maps.clone();
    let mut arena = Arena::with_source(source, 4096);

    let region = arena.ensure_initialized().unwrap();
    let start = region.start();
    region.carve(16).unwrap();
    let end = region.end();

    let region = arena.ensure_initialized().unwrap();
    assert_eq!(region.start(), start);
    assert_eq!(region.end(), end);
    assert_eq!(maps.get(), 1);
  }

  #[test]
  fn fresh_region_is_empty() {
    let mut arena = Arena::new();
    let region = arena.ensure_initialized().unwrap();

    assert_eq!(region.start(), region.end());
    assert_eq!(region.capacity(), HEAP_SIZE);
    assert_eq!(region.remaining(), HEAP_SIZE);
    assert_eq!(region.max().as_ptr() as usize - region.start().as_ptr() as usize, HEAP_SIZE);
  }

  #[test]
  fn failed_mapping_can_be_retried() {
    let source = Counting::failing(1);
    let maps = source.maps.clone();
    let mut arena = Arena::with_source(source, 4096);

    let err = arena.ensure_initialized().unwrap_err();
    assert!(matches!(err, AllocError::ArenaInitFailed { ref source } if source.raw_os_error() == Some(libc::ENOMEM)));
    assert!(!arena.is_initialized());

    assert!(arena.ensure_initialized().is_ok());
    assert_eq!(maps.get(), 2);
  }

  #[test]
  fn carve_writes_header_and_bumps_end() {
    let mut arena = Arena::with_source(Mmap, 4096);
    let region = arena.ensure_initialized().unwrap();

    let first = region.carve(32).unwrap();
    assert_eq!(first, region.at(HEADER_SIZE));
    assert_eq!(region.header_at(0), Header::allocated(32));
    assert_eq!(region.used(), HEADER_SIZE + 32);

    let second = region.carve(8).unwrap();
    assert_eq!(second, region.at(2 * HEADER_SIZE + 32));
    assert_eq!(region.header_at(HEADER_SIZE + 32), Header::allocated(8));
    assert_eq!(region.end(), region.at(2 * HEADER_SIZE + 40));
    assert_eq!(region.used(), 2 * HEADER_SIZE + 40);
  }

  #[test]
  fn carve_stops_at_max() {
    let mut arena = Arena::with_source(Mmap, 64);
    let region = arena.ensure_initialized().unwrap();

    region.carve(64 - HEADER_SIZE - 16).unwrap();
    let err = region.carve(16).unwrap_err();
    assert!(matches!(
      err,
      AllocError::OutOfMemory {
        requested: 16,
        remaining: 16
      }
    ));

    region.carve(16 - HEADER_SIZE).unwrap();
    assert_eq!(region.end(), region.max());
    assert!(region.carve(ALIGNMENT).is_err());
  }

  #[test]
  fn dropping_releases_the_mapping() {
    let source = Counting::default();
    let unmaps = source.unmaps.clone();

    let mut arena = Arena::with_source(source, 4096);
    arena.ensure_initialized().unwrap();
    drop(arena);

    assert_eq!(unmaps.get(), 1);
  }

  #[test]
  fn dropping_an_unmapped_arena_releases_nothing() {
    let source = Counting::default();
    let unmaps = source.unmaps.clone();

    drop(Arena::with_source(source, 4096));

    assert_eq!(unmaps.get(), 0);
  }
}
