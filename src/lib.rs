//! # rustmalloc - A segregated-fit dynamic memory allocator
//!
//! This crate provides a `malloc`/`free`/`realloc`/`calloc`-style dynamic
//! memory allocator implementation in Rust that manages memory using the
//! `sbrk` system call, organizing free blocks into segregated size
//! classes with boundary-tag coalescing.
//!
//! ## Overview
//!
//! Unlike a bump allocator, this allocator reuses freed memory. Blocks
//! are tagged with a header word (and, for free blocks, a matching
//! footer) encoding size and allocation state, which lets neighboring
//! free blocks be merged ("coalesced") in O(1):
//!
//! ```text
//!   Heap after a few allocate/free calls:
//!
//!   ┌──────┬────────────────────┬──────┬──────────────────────┬──────┐
//!   │ hdr  │   allocated A      │ hdr  │       free B          │ ftr  │
//!   └──────┴────────────────────┴──────┴──────────────────────┴──────┘
//!            allocated blocks carry no footer (bit 2 of the next
//!            block's header records whether the predecessor is free)
//! ```
//!
//! Free blocks are threaded into ten segregated lists by size class, each
//! kept sorted by ascending size so that first-fit within a class is
//! best-fit within that class:
//!
//! ```text
//!   Size classes (bytes):
//!   [0,32) [32,64) [64,128) [128,256) [256,512) [512,1024)
//!   [1024,2048) [2048,4096) [4096,8192) [8192,inf)
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   rustmalloc
//!   ├── constants    - Layout constants (word size, list count, offsets)
//!   ├── error        - HeapError / Violation
//!   ├── heap         - SbrkHeap: the sbrk-backed page provider
//!   ├── block        - Header/footer encoding, free-list link encoding
//!   ├── size_class   - Block size -> segregated list index
//!   ├── free_list    - FreeListRegistry: the ten sorted free lists
//!   ├── engine       - extend_heap / coalesce / place / find_fit
//!   ├── check        - check_heap consistency checker
//!   └── allocator    - Allocator: the public facade
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rustmalloc::Allocator;
//!
//! fn main() {
//!     let allocator = Allocator::new();
//!
//!     unsafe {
//!         let p = allocator.allocate(64);
//!         *(p as *mut u64) = 42;
//!         let p = allocator.resize(p, 256);
//!         allocator.free(p);
//!     }
//!
//!     assert!(allocator.check_heap("main").is_none());
//! }
//! ```
//!
//! ## How It Works
//!
//! The allocator uses `sbrk(2)` to extend the program's data segment a
//! `CHUNK` at a time, the same program memory layout a bump allocator
//! grows into:
//!
//! ```text
//!   Program Memory Layout:
//!
//!   High Address ┌─────────────────────┐
//!                │       Stack         │ ↓ grows down
//!                │         │           │
//!                │         ▼           │
//!                │                     │
//!                │         ▲           │
//!                │         │           │
//!                │       Heap          │ ↑ grows up (sbrk)
//!                ├─────────────────────┤ ← Program Break
//!                │   Uninitialized     │
//!                │       Data          │
//!                ├─────────────────────┤
//!                │   Initialized       │
//!                │       Data          │
//!                ├─────────────────────┤
//!                │       Text          │
//!   Low Address  └─────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Block reuse**: freed blocks are reused by later allocations, not
//!   just appended to
//! - **Boundary-tag coalescing**: adjacent free blocks merge in O(1)
//! - **Segregated fit**: ten size classes, each sorted for best-fit
//! - **Heap-relative free-list links**: no reliance on a fixed virtual
//!   address bias
//! - **A consistency checker** (`check_heap`) for use under test and in
//!   debug builds
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives
//! - **Never returns memory to the OS**: the heap only grows
//! - **Unix-only**: requires `libc` and `sbrk` (POSIX systems)
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory management.
//! All allocation and deallocation operations require `unsafe` blocks.

mod allocator;
mod block;
mod check;
mod constants;
mod engine;
mod error;
mod free_list;
mod heap;
mod size_class;

pub use allocator::Allocator;
pub use error::{HeapError, Violation};
