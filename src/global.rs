//! One process-wide heap with a pointer-or-null calling convention.
//!
//! Failures come back as null (or nothing, for [`free`]); the reason is left
//! in [`last_error`], which every call overwrites. The heap sits behind a
//! single mutex, so calls from several threads are serialized, but
//! `last_error` is shared: read it right after the call that set it.
//!
//! The arena is mapped on the first [`alloc`] and never released.

use std::{
  ptr::{self, NonNull},
  sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{error::ErrorCode, heap::Heap};

static HEAP: Mutex<Heap> = Mutex::new(Heap::new());

fn heap() -> MutexGuard<'static, Heap> {
  HEAP.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Allocates `size` bytes, or returns null and sets [`last_error`].
pub fn alloc(size: usize) -> *mut u8 {
  heap().allocate(size).map_or(ptr::null_mut(), NonNull::as_ptr)
}

/// Releases a pointer returned by [`alloc`]. Null is ignored.
///
/// # Safety
///
/// `ptr` must be null or a pointer returned by [`alloc`].
pub unsafe fn free(ptr: *mut u8) {
  // The failure is reported through `last_error`.
  let _ = unsafe { heap().free(ptr) };
}

pub fn last_error() -> ErrorCode {
  heap().last_error()
}

#[cfg(test)]
mod tests {
  use super::*;

  // The heap is shared by the whole test binary, so everything touching it
  // lives in this one test.
  #[test]
  fn reuses_freed_slot() {
    let p = alloc(4).cast::<i32>();
    let q = alloc(1000);
    assert!(!p.is_null() && !q.is_null());

    unsafe {
      *p = 42;
      *q = b'A';

      free(p.cast());
      assert_eq!(last_error(), ErrorCode::None);

      let r = alloc(4).cast::<i32>();
      *r = 19;

      assert_eq!(p, r);
      assert_eq!(*r, 19);
      assert_eq!(*q, b'A');

      assert!(alloc(0).is_null());
      assert_eq!(last_error(), ErrorCode::OutOfMemory);

      free(ptr::null_mut());
      assert_eq!(last_error(), ErrorCode::None);

      free(r.cast::<u8>().wrapping_sub(64));
      assert_eq!(last_error(), ErrorCode::InvalidFree);
    }
  }
}
