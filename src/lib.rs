//! # rheap - An Implicit Free-List Heap Allocator
//!
//! This crate hands out and reclaims variable-sized byte ranges from a single
//! privately owned arena, mapped once from the OS with `mmap(2)`.
//!
//! ## Overview
//!
//! Every block is preceded by a one-word header. There is no separate index:
//! the headers themselves form an implicit list that is walked from the start
//! of the arena up to the bump pointer.
//!
//! ```text
//!   Arena Layout:
//!
//!   start                                         end                      max
//!   │                                              │                        │
//!   ▼                                              ▼                        ▼
//!   ┌────┬──────────┬────┬──────┬────┬────────────┬────────────────────────┐
//!   │ H  │ payload  │ H  │ pay. │ H  │  payload   │      never touched     │
//!   └────┴──────────┴────┴──────┴────┴────────────┴────────────────────────┘
//!   └─── block ─────┘
//!
//!   Allocation first walks headers from `start` to `end` looking for a free
//!   block that is large enough (first fit). Only when none is found is a new
//!   block carved at `end`, bumping it forward.
//! ```
//!
//! ## Header Encoding
//!
//! ```text
//!   Bit position:  [63 ............... 3][2][1][0]
//!                  ^ payload size bits  | unused | free flag
//!
//!   size=24, allocated → 000...000 11000
//!   size=24, free      → 000...000 11001
//! ```
//!
//! Payload sizes are rounded up to [`ALIGNMENT`](align::ALIGNMENT) (8 bytes
//! on 64-bit targets, 4 otherwise), so the low bit of the size is always zero
//! and carries the free flag.
//!
//! ## Crate Structure
//!
//! ```text
//!   rheap
//!   ├── align      - ALIGNMENT and the align! macro
//!   ├── block      - Header codec (internal)
//!   ├── arena      - Arena mapping, bump pointer and carving
//!   ├── heap       - Heap: first-fit allocate, free, last_error
//!   ├── error      - ErrorCode, AllocError, FreeError
//!   └── global     - Process-wide heap with a null-on-failure interface
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rheap::{ErrorCode, Heap};
//!
//! let mut heap = Heap::new();
//!
//! let ptr = heap.allocate(4).unwrap().as_ptr().cast::<u32>();
//! unsafe {
//!     ptr.write(42);
//!     heap.free(ptr.cast()).unwrap();
//! }
//!
//! // The freed slot is the first fit for the next small request.
//! assert_eq!(heap.allocate(4).unwrap().as_ptr().cast::<u32>(), ptr);
//!
//! assert!(heap.allocate(0).is_err());
//! assert_eq!(heap.last_error(), ErrorCode::OutOfMemory);
//! ```
//!
//! ## Limitations
//!
//! - **Single arena**: capacity is fixed at [`HEAP_SIZE`]; there is no growth
//! - **No coalescing**: adjacent free blocks are never merged
//! - **No splitting**: a reused block keeps its original size
//! - **Trusting free**: only out-of-range pointers are rejected; an in-range
//!   pointer that is not a payload start corrupts the heap
//! - **Not thread-safe**: a [`Heap`] has no locking of its own
//! - **Unix-only**: requires `libc` and `mmap`
//!
//! ## Safety
//!
//! Allocation is safe. Releasing memory is `unsafe`, as the caller vouches
//! that the pointer came from the same heap.

pub mod align;
pub mod arena;
mod block;
pub mod error;
pub mod global;
mod heap;

pub use arena::{HEAP_SIZE, Mmap, PageSource, Region};
pub use block::HEADER_SIZE;
pub use error::{AllocError, ErrorCode, FreeError};
pub use heap::{BlockInfo, Heap, HeapStats};
