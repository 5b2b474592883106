/// Platform alignment for every payload size: 8 bytes on 64-bit targets, 4 otherwise.
///
/// Must be a power of two, the round-up trick in [`align!`] depends on it.
#[cfg(target_pointer_width = "64")]
pub const ALIGNMENT: usize = 8;

#[cfg(not(target_pointer_width = "64"))]
pub const ALIGNMENT: usize = 4;

const _: () = assert!(ALIGNMENT.is_power_of_two());

/// Rounds the given size up to the next multiple of [`ALIGNMENT`].
///
/// # Examples
///
/// ```rust
/// use rheap::{align, align::ALIGNMENT};
///
/// match ALIGNMENT {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::ALIGNMENT - 1) & !($crate::align::ALIGNMENT - 1)
  };
}

/// Same as [`align!`], but returns `None` instead of wrapping when the
/// rounded size does not fit in a `usize`.
pub const fn checked_align(size: usize) -> Option<usize> {
  match size.checked_add(ALIGNMENT - 1) {
    Some(padded) => Some(padded & !(ALIGNMENT - 1)),
    None => None,
  }
}
