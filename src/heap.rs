use std::{iter, ptr::NonNull};

use log::{trace, warn};

use crate::{
  align::checked_align,
  arena::{Arena, Mmap, PageSource, Region},
  block::{HEADER_SIZE, Header},
  error::{AllocError, ErrorCode, FreeError},
};

/// A block as seen from outside the heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  /// First byte after the header.
  pub payload: NonNull<u8>,
  pub size: usize,
  pub is_free: bool,
}

/// Occupancy summary of a heap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub capacity: usize,
  /// Bytes below the bump pointer, headers included.
  pub used: usize,
  /// Bytes above the bump pointer.
  pub remaining: usize,
  pub blocks: usize,
  pub free_blocks: usize,
  /// Payload bytes held by free blocks.
  pub free_bytes: usize,
}

/// Implicit free-list allocator over a single arena.
///
/// Blocks sit back to back from the start of the arena, each behind a
/// one-word header. Allocation reuses the first free block that is large
/// enough and otherwise carves a new block at the bump pointer. Freed blocks
/// are never merged or split.
///
/// A `Heap` is plain state with no internal locking: share it between threads
/// only behind a lock, as [`global`](crate::global) does.
#[derive(Debug)]
pub struct Heap<S: PageSource = Mmap> {
  arena: Arena<S>,
  last_error: ErrorCode,
}

impl Heap<Mmap> {
  /// A heap over a lazily mapped [`HEAP_SIZE`](crate::HEAP_SIZE) arena.
  pub const fn new() -> Self {
    Self {
      arena: Arena::new(),
      last_error: ErrorCode::None,
    }
  }
}

impl Default for Heap<Mmap> {
  fn default() -> Self {
    Self::new()
  }
}

impl<S: PageSource> Heap<S> {
  pub const fn with_source(
    source: S,
    capacity: usize,
  ) -> Self {
    Self {
      arena: Arena::with_source(source, capacity),
      last_error: ErrorCode::None,
    }
  }

  /// Outcome of the most recent `allocate` or `free` call.
  pub fn last_error(&self) -> ErrorCode {
    self.last_error
  }

  /// The mapped arena, or `None` before the first successful allocation.
  pub fn region(&self) -> Option<&Region> {
    self.arena.region()
  }

  pub fn start(&self) -> Option<NonNull<u8>> {
    self.region().map(Region::start)
  }

  /// Current bump pointer.
  pub fn end(&self) -> Option<NonNull<u8>> {
    self.region().map(Region::end)
  }

  pub fn max(&self) -> Option<NonNull<u8>> {
    self.region().map(Region::max)
  }

  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    self.last_error = ErrorCode::None;

    let result = self.try_allocate(size);
    if let Err(err) = &result {
      warn!("allocate({}) failed: {}", size, err);
      self.last_error = err.code();
    }

    result
  }

  fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::InvalidSize);
    }

    let aligned_size = checked_align(size).ok_or_else(|| AllocError::OutOfMemory {
      requested: size,
      remaining: self.region().map_or(self.arena.capacity(), Region::remaining),
    })?;

    let region = self.arena.ensure_initialized()?;

    if let Some(payload) = find_free_block(region, aligned_size) {
      trace!("allocate({}) reused block at {:?}", size, payload);
      return Ok(payload);
    }

    let payload = region.carve(aligned_size)?;
    trace!("allocate({}) carved block at {:?}, end = {:?}", size, payload, region.end());

    Ok(payload)
  }

  /// Marks the block behind `ptr` free. A null `ptr` is a no-op.
  ///
  /// Pointers below the first payload or at/after the bump pointer are
  /// rejected with [`FreeError::InvalidFree`]. Nothing else is checked: an
  /// in-bounds pointer that is not a payload start is taken at its word and
  /// the word before it is treated as a header.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a pointer returned by [`Heap::allocate`] on this
  /// heap.
  pub unsafe fn free(
    &mut self,
    ptr: *mut u8,
  ) -> Result<(), FreeError> {
    self.last_error = ErrorCode::None;

    if ptr.is_null() {
      return Ok(());
    }

    let result = self.release(ptr);
    match &result {
      Ok(()) => trace!("free({:?})", ptr),
      Err(err) => {
        warn!("free({:?}) failed: {}", ptr, err);
        self.last_error = err.code();
      }
    }

    result
  }

  fn release(
    &mut self,
    ptr: *mut u8,
  ) -> Result<(), FreeError> {
    let addr = ptr as usize;
    let invalid = FreeError::InvalidFree { addr };

    let region = self.arena.region_mut().ok_or_else(|| invalid.clone())?;
    let payload = region
      .offset_of(addr)
      .filter(|&offset| offset >= HEADER_SIZE && offset < region.end_offset())
      .ok_or(invalid)?;

    region.set_free_at(payload - HEADER_SIZE, true);

    Ok(())
  }

  /// Every block from `start` to `end`, in address order.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    self.region().into_iter().flat_map(|region| {
      walk(region).map(move |(offset, header)| BlockInfo {
        payload: region.at(offset + HEADER_SIZE),
        size: header.size,
        is_free: header.is_free,
      })
    })
  }

  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      capacity: self.arena.capacity(),
      remaining: self.arena.capacity(),
      ..HeapStats::default()
    };

    if let Some(region) = self.region() {
      stats.used = region.used();
      stats.remaining = region.remaining();
    }

    for block in self.blocks() {
      stats.blocks += 1;
      if block.is_free {
        stats.free_blocks += 1;
        stats.free_bytes += block.size;
      }
    }

    stats
  }
}

/// Walks headers from `start`, stopping at the `end` observed on entry.
fn walk(region: &Region) -> impl Iterator<Item = (usize, Header)> + '_ {
  let end = region.end_offset();
  let mut cursor = 0usize;

  iter::from_fn(move || {
    if cursor.checked_add(HEADER_SIZE)? > end {
      return None;
    }

    let offset = cursor;
    let header = region.header_at(offset);
    cursor = offset.saturating_add(HEADER_SIZE).saturating_add(header.size);

    Some((offset, header))
  })
}

/// First-fit: claims the first free block of at least `aligned_size` bytes.
/// The block keeps its full size.
fn find_free_block(
  region: &mut Region,
  aligned_size: usize,
) -> Option<NonNull<u8>> {
  let (offset, _) = walk(region).find(|(_, header)| header.is_free && header.size >= aligned_size)?;

  region.set_free_at(offset, false);

  Some(region.at(offset + HEADER_SIZE))
}
